pub mod attempt_service;
pub mod auth_service;
pub mod export_service;
pub mod result_service;
pub mod scoring_service;
pub mod test_service;
