pub mod course;
pub mod file;
pub mod user;

pub use course::{
    Course, CourseUpdateField, EmailFrequency, NewCourseRequest, UpdateCourseRequest,
    MAX_NUM_QUESTIONS, MIN_NUM_QUESTIONS,
};
pub use file::FileSelection;
pub use user::{Credentials, LoginResponse, Profile, RegisterRequest, UserSummary};
