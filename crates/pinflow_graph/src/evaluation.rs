// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pull evaluation of pin values.
//!
//! Reading an input pin runs the producer of the output feeding it, which may in turn
//! read its own node's inputs. Nothing is cached between calls. The graph keeps one
//! stack of input pins being resolved, shared by every read including reads a producer
//! issues through [`Eval::graph`]; reaching a pin already on the stack yields that
//! pin's default value instead of recursing.

use crate::graph::Graph;
use crate::node::NodeId;
use crate::pin::{InPin, OutPin, PinData, PinRef, PinUid};
use std::cell::{Cell, RefCell};

/// Error during evaluation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    /// A pin depends on itself; the default value was substituted
    #[error("Evaluation cycle broken at {0:?}")]
    Cycle(PinRef),

    /// Pin or node no longer exists
    #[error("Invalid pin handle: {0:?}")]
    InvalidHandle(PinRef),

    /// Stored value does not have the requested type
    #[error("Pin {pin:?} does not carry {expected}")]
    TypeMismatch {
        /// Pin that was read
        pin: PinRef,
        /// Requested type
        expected: &'static str,
    },
}

/// Input pins currently being resolved
#[derive(Debug, Default)]
pub(crate) struct EvalStack {
    pins: RefCell<Vec<PinRef>>,
    cycle: Cell<Option<PinRef>>,
}

impl EvalStack {
    /// Push `pin`, or record a cycle and return `false` if it is already being resolved
    fn enter(&self, pin: PinRef) -> bool {
        let mut pins = self.pins.borrow_mut();
        if pins.contains(&pin) {
            if self.cycle.get().is_none() {
                self.cycle.set(Some(pin));
            }
            return false;
        }
        pins.push(pin);
        true
    }

    fn leave(&self) {
        self.pins.borrow_mut().pop();
    }

    fn take_cycle(&self) -> Option<PinRef> {
        self.cycle.take()
    }

    /// Record `inner` while keeping the earliest cycle seen by an enclosing read
    fn restore_cycle(&self, outer: Option<PinRef>, inner: Option<PinRef>) {
        self.cycle.set(outer.or(inner));
    }
}

/// Context handed to output producers
pub struct Eval<'g> {
    graph: &'g Graph,
    node: NodeId,
}

impl<'g> Eval<'g> {
    /// Node owning the output being produced
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The graph being evaluated. Reads through it share this evaluation's cycle guard.
    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    /// Read any input pin within the current evaluation
    pub fn value<T: PinData>(&self, pin: InPin<T>) -> T {
        self.graph.value(pin)
    }

    /// Read an input of the node being evaluated
    pub fn input<T: PinData>(&self, uid: impl Into<PinUid>) -> T {
        self.value(InPin::new(self.node, uid.into()))
    }

    /// Whether an input of the node being evaluated is connected
    pub fn is_connected(&self, uid: impl Into<PinUid>) -> bool {
        self.graph.is_connected(PinRef::input(self.node, uid))
    }
}

impl Graph {
    /// Value of an input pin: its default when unconnected, otherwise the upstream
    /// producer's output. Cycles and invalid handles degrade to the default.
    pub fn value<T: PinData>(&self, pin: InPin<T>) -> T {
        let pin = pin.pin_ref();
        let result = self.resolve_input::<T>(pin);
        self.or_default(pin, result)
    }

    /// Like [`Graph::value`] but reports broken cycles and invalid handles
    pub fn try_value<T: PinData>(&self, pin: InPin<T>) -> Result<T, EvaluationError> {
        let stack = &self.eval_stack;
        let outer = stack.take_cycle();
        let result = self.resolve_input::<T>(pin.pin_ref());
        let inner = stack.take_cycle();
        stack.restore_cycle(outer, inner);
        let value = result?;
        match inner {
            Some(at) => Err(EvaluationError::Cycle(at)),
            None => Ok(value),
        }
    }

    /// Run an output's producer directly
    pub fn output_value<T: PinData>(&self, pin: OutPin<T>) -> T {
        self.resolve_output::<T>(pin.pin_ref()).unwrap_or_default()
    }

    fn resolve_input<T: PinData>(&self, pin: PinRef) -> Result<T, EvaluationError> {
        let stack = &self.eval_stack;
        let input = self.input_pin(pin).ok_or(EvaluationError::InvalidHandle(pin))?;
        let default = || {
            input.default_value::<T>().ok_or(EvaluationError::TypeMismatch {
                pin,
                expected: std::any::type_name::<T>(),
            })
        };

        let Some(link) = input.link() else {
            return default();
        };
        if !stack.enter(pin) {
            tracing::trace!(?pin, "evaluation cycle broken, using default value");
            return default();
        }
        let result = self.resolve_output::<T>(link.output());
        stack.leave();
        result
    }

    fn resolve_output<T: PinData>(&self, pin: PinRef) -> Result<T, EvaluationError> {
        let output = self.output_pin(pin).ok_or(EvaluationError::InvalidHandle(pin))?;
        let eval = Eval {
            graph: self,
            node: pin.node,
        };
        let value = output
            .produce(&eval)
            .downcast::<T>()
            .map_err(|_| EvaluationError::TypeMismatch {
                pin,
                expected: std::any::type_name::<T>(),
            })?;
        output.store_last(Box::new((*value).clone()));
        Ok(*value)
    }

    /// Unwrap an evaluation result, falling back to the pin's default
    fn or_default<T: PinData>(&self, pin: PinRef, result: Result<T, EvaluationError>) -> T {
        result.unwrap_or_else(|_| {
            self.input_pin(pin)
                .and_then(|input| input.default_value::<T>())
                .unwrap_or_default()
        })
    }
}
