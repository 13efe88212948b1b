pub mod folders;
pub mod jobs;
pub mod progress;
pub mod system;
pub mod videos;
