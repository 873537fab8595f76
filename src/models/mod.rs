pub mod attempt;
pub mod faculty;
pub mod proctor_event;
pub mod question;
pub mod score;
pub mod student;
