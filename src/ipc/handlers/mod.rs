pub mod core;
pub mod drafts;
pub mod grades;
pub mod grading_scale;
