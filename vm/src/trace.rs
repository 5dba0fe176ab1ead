//! Stack trace builder. Walks logical frames without touching handler
//! tables or frame state.

use std::fmt;

use memory::Value;
use serde::Serialize;

use crate::code_block::ImplementationVisibility;
use crate::function::function_index;
use crate::machine::{Callee, FrameId, VM};
use crate::unwind::visitor::LogicalFrame;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StackFrame {
    Code {
        function: String,
        source_url: String,
        line: u32,
        column: u32,
    },
    Native {
        function: String,
    },
    Foreign {
        function: String,
    },
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackFrame::Code {
                function,
                source_url,
                line,
                column,
            } => {
                if function.is_empty() {
                    write!(f, "{source_url}:{line}:{column}")
                } else {
                    write!(f, "{function}@{source_url}:{line}:{column}")
                }
            }
            StackFrame::Native { function } => write!(f, "{function}@[native code]"),
            StackFrame::Foreign { function } => write!(f, "{function}@[wasm code]"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraceBound {
    #[default]
    None,
    /// Drop every frame up to and including the first frame running this
    /// callee.
    SkipUntilCallee(Value),
    /// Stop collecting at the first frame running this callee.
    StopAtCallee(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRequest {
    pub skip: usize,
    pub max: usize,
    pub bound: TraceBound,
}

impl Default for TraceRequest {
    fn default() -> Self {
        Self {
            skip: 0,
            max: usize::MAX,
            bound: TraceBound::None,
        }
    }
}

impl VM {
    /// Trace from `start` (the innermost frame when `None`) outward.
    pub fn build_trace(&self, start: Option<FrameId>, request: &TraceRequest) -> Vec<StackFrame> {
        let _no_gc = self.gc.assert_no_gc();
        let mut results = Vec::new();
        let Some(start) = start.or_else(|| self.frames.len().checked_sub(1).map(FrameId)) else {
            return results;
        };
        if request.max == 0 {
            return results;
        }

        let mut skipped = 0;
        let mut found_caller = !matches!(request.bound, TraceBound::SkipUntilCallee(_));
        for logical in self.logical_frames(start) {
            if results.len() >= request.max {
                break;
            }
            if skipped < request.skip {
                skipped += 1;
                continue;
            }
            let callee = self.logical_callee(logical);
            if !found_caller {
                if let TraceBound::SkipUntilCallee(target) = request.bound {
                    if callee == Some(target) {
                        found_caller = true;
                    }
                }
                skipped += 1;
                continue;
            }
            if let TraceBound::StopAtCallee(target) = request.bound {
                if callee == Some(target) {
                    break;
                }
            }
            if self.is_private_frame(logical) {
                continue;
            }
            results.push(self.describe_frame(logical));
        }
        results
    }

    fn logical_callee(&self, logical: LogicalFrame) -> Option<Value> {
        if logical.is_inlined() {
            return None;
        }
        self.frames[logical.frame.0].callee.value()
    }

    fn is_private_frame(&self, logical: LogicalFrame) -> bool {
        if let Some(code_block) = self.logical_code_block(logical) {
            if code_block.visibility == ImplementationVisibility::Private {
                return true;
            }
        }
        self.logical_callee(logical)
            .and_then(|callee| self.function_record(callee))
            .is_some_and(|record| record.visibility == ImplementationVisibility::Private)
    }

    fn describe_frame(&self, logical: LogicalFrame) -> StackFrame {
        let frame = &self.frames[logical.frame.0];
        if let Callee::Foreign(callee) = &frame.callee {
            return StackFrame::Foreign {
                function: callee.index_or_name(),
            };
        }
        let function = self.logical_function_name(logical);
        match self.logical_code_block(logical) {
            Some(code_block) if !code_block.unlinked.is_builtin => {
                let (line, column) = code_block.source.position_for(logical.bytecode_index);
                StackFrame::Code {
                    function,
                    source_url: code_block.source.url.clone(),
                    line,
                    column,
                }
            }
            _ => StackFrame::Native { function },
        }
    }

    fn logical_function_name(&self, logical: LogicalFrame) -> String {
        let frame = &self.frames[logical.frame.0];
        if let Some(index) = logical.inline_frame {
            return frame
                .code_block
                .as_ref()
                .and_then(|cb| cb.inline_frame(index))
                .map(|inline| inline.callee_name.clone())
                .unwrap_or_default();
        }
        let from_record = frame
            .callee
            .value()
            .and_then(|v| function_index(&self.heap, v))
            .and_then(|i| self.functions.get(i as usize))
            .map(|record| record.name.clone());
        from_record
            .or_else(|| frame.code_block.as_ref().map(|cb| cb.name.clone()))
            .unwrap_or_default()
    }
}

/// Innermost-first, newline separated.
pub fn render_trace(frames: &[StackFrame]) -> String {
    frames
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_each_frame_shape() {
        let frames = vec![
            StackFrame::Code {
                function: "inner".into(),
                source_url: "app.js".into(),
                line: 3,
                column: 9,
            },
            StackFrame::Native {
                function: "apply".into(),
            },
            StackFrame::Foreign {
                function: "wasm-function[4]".into(),
            },
            StackFrame::Code {
                function: String::new(),
                source_url: "app.js".into(),
                line: 1,
                column: 1,
            },
        ];
        assert_eq!(
            render_trace(&frames),
            "inner@app.js:3:9\napply@[native code]\nwasm-function[4]@[wasm code]\napp.js:1:1"
        );
    }

    #[test]
    fn empty_trace_renders_empty() {
        assert_eq!(render_trace(&[]), "");
    }

    #[test]
    fn frames_serialize_with_kind_tag() {
        let json = serde_json::to_string(&StackFrame::Native {
            function: "f".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"native","function":"f"}"#);
    }
}
