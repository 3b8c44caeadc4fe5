use log::{info, warn};

/// What the runtime's latest session state asks of us
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Nothing,
    /// Call `xrBeginSession`
    Begin,
    /// Call `xrEndSession`
    End,
    /// Drop the session and leave the render loop
    Exit,
}

/// Tracks the session lifecycle reported through session-state-changed
/// events and decides when the frame loop may run.
#[derive(Debug, Clone)]
pub struct SessionLifecycle {
    state: xr::SessionState,
    running: bool,
    quit: bool,
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self {
            state: xr::SessionState::UNKNOWN,
            running: false,
            quit: false,
        }
    }
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> xr::SessionState {
        self.state
    }

    /// The session has been begun and not yet ended
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Frames may only be waited on while the session is running
    pub fn should_render(&self) -> bool {
        self.running && !self.quit
    }

    pub fn is_focused(&self) -> bool {
        self.state == xr::SessionState::FOCUSED
    }

    pub fn on_state_changed(&mut self, new_state: xr::SessionState) -> SessionCommand {
        info!(
            "EVENT: session state changed from {:?} to {:?}",
            self.state, new_state
        );
        self.state = new_state;

        match new_state {
            xr::SessionState::UNKNOWN | xr::SessionState::IDLE => SessionCommand::Nothing,
            xr::SessionState::READY => {
                // READY can be repeated while the runtime hasn't moved on after xrBeginSession
                if self.running {
                    SessionCommand::Nothing
                } else {
                    self.running = true;
                    SessionCommand::Begin
                }
            }
            xr::SessionState::SYNCHRONIZED
            | xr::SessionState::VISIBLE
            | xr::SessionState::FOCUSED => SessionCommand::Nothing,
            xr::SessionState::STOPPING => {
                if self.running {
                    self.running = false;
                    SessionCommand::End
                } else {
                    SessionCommand::Nothing
                }
            }
            xr::SessionState::LOSS_PENDING | xr::SessionState::EXITING => {
                self.running = false;
                self.quit = true;
                SessionCommand::Exit
            }
            other => {
                warn!("Unknown session state {:?}, ignoring", other);
                SessionCommand::Nothing
            }
        }
    }

    pub fn on_instance_loss_pending(&mut self) {
        self.running = false;
        self.quit = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xr::SessionState as S;

    #[test]
    fn starts_idle_and_not_rendering() {
        let lifecycle = SessionLifecycle::new();
        assert_eq!(lifecycle.state(), S::UNKNOWN);
        assert!(!lifecycle.is_running());
        assert!(!lifecycle.should_render());
        assert!(!lifecycle.should_quit());
    }

    #[test]
    fn full_lifecycle() {
        let mut lifecycle = SessionLifecycle::new();

        assert_eq!(lifecycle.on_state_changed(S::IDLE), SessionCommand::Nothing);
        assert!(!lifecycle.should_render());

        assert_eq!(lifecycle.on_state_changed(S::READY), SessionCommand::Begin);
        assert!(lifecycle.should_render());

        for state in [S::SYNCHRONIZED, S::VISIBLE, S::FOCUSED] {
            assert_eq!(lifecycle.on_state_changed(state), SessionCommand::Nothing);
            assert!(lifecycle.should_render());
        }
        assert!(lifecycle.is_focused());

        assert_eq!(lifecycle.on_state_changed(S::VISIBLE), SessionCommand::Nothing);
        assert!(!lifecycle.is_focused());
        assert_eq!(lifecycle.on_state_changed(S::SYNCHRONIZED), SessionCommand::Nothing);

        assert_eq!(lifecycle.on_state_changed(S::STOPPING), SessionCommand::End);
        assert!(!lifecycle.should_render());

        assert_eq!(lifecycle.on_state_changed(S::IDLE), SessionCommand::Nothing);
        assert_eq!(lifecycle.on_state_changed(S::EXITING), SessionCommand::Exit);
        assert!(lifecycle.should_quit());
        assert!(!lifecycle.should_render());
    }

    #[test]
    fn repeated_ready_begins_once() {
        let mut lifecycle = SessionLifecycle::new();
        assert_eq!(lifecycle.on_state_changed(S::READY), SessionCommand::Begin);
        assert_eq!(lifecycle.on_state_changed(S::READY), SessionCommand::Nothing);
        assert!(lifecycle.is_running());
    }

    #[test]
    fn stopping_without_running_does_not_end() {
        let mut lifecycle = SessionLifecycle::new();
        assert_eq!(lifecycle.on_state_changed(S::STOPPING), SessionCommand::Nothing);

        lifecycle.on_state_changed(S::READY);
        assert_eq!(lifecycle.on_state_changed(S::STOPPING), SessionCommand::End);
        assert_eq!(lifecycle.on_state_changed(S::STOPPING), SessionCommand::Nothing);
    }

    #[test]
    fn session_can_restart_after_stopping() {
        let mut lifecycle = SessionLifecycle::new();
        lifecycle.on_state_changed(S::READY);
        lifecycle.on_state_changed(S::STOPPING);
        lifecycle.on_state_changed(S::IDLE);
        assert_eq!(lifecycle.on_state_changed(S::READY), SessionCommand::Begin);
        assert!(lifecycle.should_render());
    }

    #[test]
    fn loss_pending_exits() {
        let mut lifecycle = SessionLifecycle::new();
        lifecycle.on_state_changed(S::READY);
        assert_eq!(lifecycle.on_state_changed(S::LOSS_PENDING), SessionCommand::Exit);
        assert!(lifecycle.should_quit());
        assert!(!lifecycle.is_running());
    }

    #[test]
    fn instance_loss_stops_rendering() {
        let mut lifecycle = SessionLifecycle::new();
        lifecycle.on_state_changed(S::READY);
        lifecycle.on_state_changed(S::FOCUSED);
        lifecycle.on_instance_loss_pending();
        assert!(lifecycle.should_quit());
        assert!(!lifecycle.should_render());
    }
}
