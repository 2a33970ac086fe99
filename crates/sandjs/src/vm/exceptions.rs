//! `THROW`/`TRY_START`/`TRY_END`/`CATCH` and exception unwinding (§7).
//!
//! `TRY_START` registers `(frame_depth, catch_ip, stack_depth)` on a
//! VM-global handler stack; `THROW` (or any opcode that fails) searches it
//! from the top, discarding frames and handlers that belong to scopes the
//! exception has already unwound past. `Uncatchable` errors
//! (`MemoryLimit`/`TimeLimit`) skip this search entirely — the one sandbox
//! boundary guest `try`/`catch` cannot cross.

use super::{HandlerEntry, VM};
use crate::exception::RunError;
use crate::io::PrintWriter;
use crate::resource::ResourceTracker;
use crate::tracer::VmTracer;

impl<T: ResourceTracker, P: PrintWriter, Tr: VmTracer> VM<'_, T, P, Tr> {
    pub(super) fn op_try_start(&mut self, offset: i16) {
        let frame_depth = self.frames.len() - 1;
        let catch_ip = {
            let frame = self.current_frame();
            (frame.ip as i64 + i64::from(offset)) as usize
        };
        let stack_depth = self.stack.len();
        self.handlers.push(HandlerEntry { frame_depth, catch_ip, stack_depth });
    }

    /// Searches the handler stack for one that still applies, unwinding
    /// frames and the operand stack to match. Returns `Ok(())` once the
    /// current frame's `ip` has been redirected to a `CATCH`; returns the
    /// original error if no handler remains (or it was uncatchable), for
    /// the caller to propagate to the host.
    pub(super) fn handle_exception(&mut self, err: RunError) -> Result<(), RunError> {
        let RunError::Exc(exc) = err else { return Err(err) };
        loop {
            let Some(handler) = self.handlers.pop() else {
                return Err(RunError::Exc(exc));
            };
            if handler.frame_depth >= self.frames.len() {
                // Registered by a frame that has since returned normally
                // (e.g. `return` inside the `try`, which never reaches
                // `TRY_END`); no longer reachable.
                continue;
            }
            self.frames.truncate(handler.frame_depth + 1);
            self.stack.truncate(handler.stack_depth);
            self.pending_exception = Some(exc.value);
            self.current_frame_mut().ip = handler.catch_ip;
            return Ok(());
        }
    }
}
