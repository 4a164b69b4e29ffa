pub mod catchers;
pub mod config;
pub mod cors;
pub mod error;
pub mod persistence;
pub mod registry;
pub mod routes;
pub mod utils;
pub use shared::{models::*, error::*, caller::*};

use rocket::{Build, Rocket};

use crate::config::ServiceConfig;
use crate::routes::AppState;

/// Assembles the HTTP service around an already populated registry.
pub fn build_rocket(state: AppState, config: &ServiceConfig) -> Rocket<Build> {
    rocket::build()
        .attach(cors::CORS::new(config.allowed_origin.clone()))
        .manage(state)
        .mount("/api", routes::api_routes())
        .register(
            "/",
            rocket::catchers![
                catchers::bad_request,
                catchers::forbidden,
                catchers::not_found,
                catchers::conflict,
                catchers::unprocessable,
                catchers::internal_error
            ],
        )
}

#[cfg(test)]
mod tests;
