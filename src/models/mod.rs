// Data models for the task tracker API

pub mod activity;
pub mod task;
pub mod user;

pub use activity::{Activity, ActivityAction, ActivityFilter, TaskInfo};
pub use task::{NewTask, Priority, Task, TaskPatch, TaskStatus};
pub use user::{LoginRequest, LoginResponse, SignupRequest, SignupResponse, UserProfile, UserRole};
