pub mod course_update;
pub mod registration;
pub mod section;

pub use course_update::CourseUpdate;
pub use registration::{AlertSource, RegStatus, RegisterRequest, Registration};
pub use section::{Section, SectionStatus, normalize_section_code};
