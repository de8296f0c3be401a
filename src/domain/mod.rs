pub mod boards;
pub mod models;
pub mod pomodoro;
