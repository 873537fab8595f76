pub mod auth_dto;
pub mod faculty_dto;
pub mod student_dto;
