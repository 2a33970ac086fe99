//! Zero-cost-by-default execution tracing.
//!
//! `VmTracer` hooks instruction dispatch, calls, and returns. Monomorphized
//! against `NoopTracer`, every hook call inlines away to nothing — the
//! pattern (and the decision not to reach for the `tracing` crate in the
//! VM's hot loop) is grounded on `ouros::tracer`.

use crate::compiler::op::Opcode;

/// One traced event, used by `RecordingTracer` to build a replay log.
#[derive(Debug, Clone)]
pub enum TraceEvent {
    Instruction { ip: usize, opcode: Opcode, stack_depth: usize },
    Call { callee_name: String, depth: usize },
    Return { depth: usize },
}

pub trait VmTracer {
    fn on_instruction(&mut self, ip: usize, opcode: Opcode, stack_depth: usize) {
        let _ = (ip, opcode, stack_depth);
    }
    fn on_call(&mut self, callee_name: &str, depth: usize) {
        let _ = (callee_name, depth);
    }
    fn on_return(&mut self, depth: usize) {
        let _ = depth;
    }
}

/// Default, production tracer: every hook is a no-op that the optimizer
/// removes entirely.
#[derive(Debug, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Human-readable opcode trace written to stderr as execution proceeds.
#[derive(Debug, Default)]
pub struct StderrTracer;

impl VmTracer for StderrTracer {
    fn on_instruction(&mut self, ip: usize, opcode: Opcode, stack_depth: usize) {
        eprintln!("{ip:>6}  {opcode:?}  (stack={stack_depth})");
    }

    fn on_call(&mut self, callee_name: &str, depth: usize) {
        eprintln!("{}-> call {callee_name}", "  ".repeat(depth));
    }

    fn on_return(&mut self, depth: usize) {
        eprintln!("{}<- return", "  ".repeat(depth.saturating_sub(1)));
    }
}

/// Records which bytecode offsets were executed, for fuzzing/coverage use.
#[derive(Debug, Default)]
pub struct CoverageTracer {
    pub hit_offsets: std::collections::BTreeSet<usize>,
}

impl VmTracer for CoverageTracer {
    fn on_instruction(&mut self, ip: usize, _opcode: Opcode, _stack_depth: usize) {
        self.hit_offsets.insert(ip);
    }
}

/// Tallies opcode execution frequency and max call depth reached.
#[derive(Debug, Default)]
pub struct ProfilingTracer {
    pub opcode_counts: std::collections::HashMap<Opcode, u64>,
    pub max_depth: usize,
}

#[derive(Debug, Default, Clone)]
pub struct ProfilingReport {
    pub opcode_counts: std::collections::HashMap<Opcode, u64>,
    pub max_depth: usize,
}

impl ProfilingTracer {
    #[must_use]
    pub fn report(&self) -> ProfilingReport {
        ProfilingReport { opcode_counts: self.opcode_counts.clone(), max_depth: self.max_depth }
    }
}

impl VmTracer for ProfilingTracer {
    fn on_instruction(&mut self, _ip: usize, opcode: Opcode, _stack_depth: usize) {
        *self.opcode_counts.entry(opcode).or_insert(0) += 1;
    }

    fn on_call(&mut self, _callee_name: &str, depth: usize) {
        self.max_depth = self.max_depth.max(depth);
    }
}

/// Collects the full event stream, for test assertions and replay.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    pub events: Vec<TraceEvent>,
}

impl VmTracer for RecordingTracer {
    fn on_instruction(&mut self, ip: usize, opcode: Opcode, stack_depth: usize) {
        self.events.push(TraceEvent::Instruction { ip, opcode, stack_depth });
    }

    fn on_call(&mut self, callee_name: &str, depth: usize) {
        self.events.push(TraceEvent::Call { callee_name: callee_name.to_string(), depth });
    }

    fn on_return(&mut self, depth: usize) {
        self.events.push(TraceEvent::Return { depth });
    }
}
