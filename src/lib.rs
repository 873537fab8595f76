pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use crate::services::{
    attempt_service::AttemptService, auth_service::AuthService, result_service::ResultService,
    test_service::TestService,
};
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub test_service: TestService,
    pub attempt_service: AttemptService,
    pub result_service: ResultService,
    pub auth_service: AuthService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let test_service = TestService::new(pool.clone());
        let attempt_service = AttemptService::new(pool.clone());
        let result_service = ResultService::new(pool.clone());
        let auth_service = AuthService::new(pool.clone());

        Self {
            pool,
            test_service,
            attempt_service,
            result_service,
            auth_service,
        }
    }
}
