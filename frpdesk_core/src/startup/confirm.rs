/// Blocking yes/no question put to the user.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Answers every question the same way (`--yes`, tests, unattended runs).
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Confirm for FixedAnswer {
    fn confirm(&self, prompt: &str) -> bool {
        log::debug!("Auto-answering {:?} with {}", prompt, self.0);
        self.0
    }
}
