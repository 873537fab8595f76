use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::faculty::Faculty;
use crate::models::student::Student;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterStudentRequest {
    #[validate(length(min = 1))]
    pub roll_no: String,
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub class_name: String,
    #[validate(email)]
    pub email: String,
    pub phone: Option<String>,
    #[validate(length(min = 8))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StudentLoginRequest {
    #[validate(length(min = 1))]
    pub roll_no: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterFacultyRequest {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FacultyLoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentAuthResponse {
    pub token: String,
    pub student: Student,
}

#[derive(Debug, Clone, Serialize)]
pub struct FacultyAuthResponse {
    pub token: String,
    pub faculty: Faculty,
}
