pub mod boards;
pub mod bootstrap;
pub mod commands;
pub mod notifications;
pub mod pomodoro;
pub mod progress;
pub mod session;
pub mod store;
pub mod tasks;

#[cfg(test)]
pub(crate) mod testing;
