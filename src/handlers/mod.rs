pub mod calendar_handlers;
pub mod habit_handlers;
pub mod pomodoro_handlers;
pub mod productivity_handlers;
pub mod task_handlers;
