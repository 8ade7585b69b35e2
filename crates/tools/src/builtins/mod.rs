//! Concrete tools exposed to the LLM tool-calling loop, grouped by the
//! external service family they call into.

pub mod calendar;
pub mod mail;
pub mod task_board;

pub use calendar::{CalendarCancelTool, CalendarCreateTool, CalendarModifyTool, CalendarNoteTool};
pub use mail::MailSendTool;
pub use task_board::{TaskBoardDispatchTool, TaskBoardListTool, TaskBoardLookupTool};
