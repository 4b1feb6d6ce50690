//! Elementwise arithmetic over two synchronized inputs.

use crate::error::{EngineError, Result};
use crate::operation::{Operation, ProcessContext, StepResult};
use crate::properties::{self, PropertyEntry, PropertyKind, PropertySpec, PropertyValue};
use crate::socket::SocketSpec;
use crate::variant::{TypeSet, Variant, VariantKind};

/// The operator applied to each input pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticFunction {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithmeticFunction {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "add" => Some(Self::Add),
            "subtract" => Some(Self::Subtract),
            "multiply" => Some(Self::Multiply),
            "divide" => Some(Self::Divide),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Add => a + b,
            Self::Subtract => a - b,
            Self::Multiply => a * b,
            Self::Divide => a / b,
        }
    }
}

/// Combines pairs of objects from its two inputs, which share one
/// synchronization group: a step fires only when both `a` and `b` hold a
/// value, so the pairing is positional even when one producer runs ahead.
///
/// Two integers produce an integer (division excepted), any other numeric
/// pair a float, and two matrices combine elementwise.
pub struct Arithmetic {
    function: ArithmeticFunction,
}

static PROPERTIES: &[PropertyEntry<Arithmetic>] = &[PropertyEntry {
    name: "function",
    kind: PropertyKind::Str,
    get: |op| PropertyValue::Str(op.function.as_str().to_string()),
    set: |op, v| match v.as_str().and_then(ArithmeticFunction::parse) {
        Some(f) => {
            op.function = f;
            true
        }
        None => false,
    },
}];

impl Arithmetic {
    pub fn new() -> Self {
        Self {
            function: ArithmeticFunction::Add,
        }
    }

    fn combine(&self, a: &Variant, b: &Variant) -> Result<Variant> {
        match (a.kind(), b.kind()) {
            (VariantKind::Int, VariantKind::Int)
                if self.function != ArithmeticFunction::Divide =>
            {
                let (x, y) = (a.as_int()?, b.as_int()?);
                let result = match self.function {
                    ArithmeticFunction::Add => x.checked_add(y),
                    ArithmeticFunction::Subtract => x.checked_sub(y),
                    ArithmeticFunction::Multiply => x.checked_mul(y),
                    ArithmeticFunction::Divide => unreachable!(),
                };
                result.map(Variant::from).ok_or_else(|| {
                    EngineError::execution("arithmetic", "integer overflow")
                })
            }
            (VariantKind::Matrix, VariantKind::Matrix) => {
                let (x, y) = (a.as_matrix()?, b.as_matrix()?);
                if x.dim() != y.dim() {
                    return Err(EngineError::execution(
                        "arithmetic",
                        format!("matrix dimensions {:?} and {:?} differ", x.dim(), y.dim()),
                    ));
                }
                let mut out = x.clone();
                out.zip_mut_with(y, |p, &q| *p = self.function.apply(*p, q));
                Ok(Variant::from(out))
            }
            _ => {
                let (x, y) = (a.as_number()?, b.as_number()?);
                if self.function == ArithmeticFunction::Divide && y == 0.0 {
                    return Err(EngineError::execution("arithmetic", "division by zero"));
                }
                Ok(Variant::from(self.function.apply(x, y)))
            }
        }
    }
}

impl Default for Arithmetic {
    fn default() -> Self {
        Self::new()
    }
}

const OPERAND: TypeSet = TypeSet::NUMERIC.union(TypeSet::MATRIX);

impl Operation for Arithmetic {
    fn name(&self) -> &str {
        "arithmetic"
    }

    fn input_specs(&self) -> &[SocketSpec] {
        static INPUTS: &[SocketSpec] = &[
            SocketSpec::input("a", OPERAND),
            SocketSpec::input("b", OPERAND),
        ];
        INPUTS
    }

    fn output_specs(&self) -> &[SocketSpec] {
        static OUTPUTS: &[SocketSpec] = &[SocketSpec::output("result", OPERAND)];
        OUTPUTS
    }

    fn process(&mut self, ctx: &mut ProcessContext) -> Result<StepResult> {
        let a = ctx.require_input(0)?;
        let b = ctx.require_input(1)?;
        let result = self.combine(a, b)?;
        ctx.emit(0, result)?;
        Ok(StepResult::Continue)
    }

    fn properties(&self) -> Vec<PropertySpec> {
        properties::specs(PROPERTIES)
    }

    fn get_property(&self, name: &str) -> Option<PropertyValue> {
        properties::get(PROPERTIES, self, name)
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        properties::set(PROPERTIES, self, "arithmetic", name, &value)
    }
}
