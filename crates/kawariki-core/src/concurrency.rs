use crate::exit;
use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPT_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Keep the launcher alive through the first Ctrl-C.
///
/// Before the game starts, `Engine::launch` sees the recorded interrupt and
/// aborts after cleanup. Once it runs, the game shares the terminal's process
/// group and receives the interrupt itself; the launcher keeps waiting for it
/// so cleanup still runs before the exit status is propagated. A second
/// Ctrl-C exits immediately.
pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if INTERRUPT_REQUESTED.swap(true, Ordering::SeqCst) {
            std::process::exit(i32::from(exit::INTERRUPTED));
        }
        eprintln!("\ninterrupt received, cleaning up (press again to force)...");
    });
}

pub fn interrupt_requested() -> bool {
    INTERRUPT_REQUESTED.load(Ordering::SeqCst)
}
