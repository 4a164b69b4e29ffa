pub mod caller;
pub mod clock;
pub mod election;
pub mod error;
pub mod models;
pub mod results;
pub mod validation;

pub use caller::Caller;
pub use clock::{Clock, ManualClock, SystemClock};
pub use election::{Election, PendingCandidate, PendingVote};
pub use error::{ElectionError, ErrorCode, ErrorResponse, Result};
pub use models::*;
pub use results::{leading_candidates, Leaderboard};
pub use validation::ValidationError;
