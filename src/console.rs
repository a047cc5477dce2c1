//! The console collaborator contract.
//!
//! The shell never talks to a terminal directly; it goes through this trait.
//! Output is either a whole line pushed while a command is still streaming,
//! or a final result paired with a fresh prompt. The console also learns
//! whether the shell is currently inside a command so it can switch its
//! key-handling mode, and the prompt string derived from the current path.
//!
//! Input travels the other way as a byte pipe of typed lines; the feed is
//! ended with [`crate::pipe::END_OF_INPUT`].

pub trait Console: Send + Sync {
    /// Push one complete output line while a command is running.
    fn print_line(&self, line: &str);

    /// Deliver the final (possibly empty) result of a command and re-show
    /// the prompt.
    fn print_results(&self, result: &str);

    /// The shell entered or left command execution.
    fn set_in_command(&self, in_command: bool);

    /// The prompt string changed, typically after `cd`.
    fn set_prompt(&self, prompt: &str);
}
