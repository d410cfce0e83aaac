pub mod courses_page;
pub mod notification;

pub use courses_page::{ActionOutcome, CoursesPage};
pub use notification::{Notification, NotificationLevel};
