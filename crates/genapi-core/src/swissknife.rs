//! `SwissKnife` and `Converter` node behavior layered on the [`crate::expr`]
//! compiler. A SwissKnife holds one formula over a set of named `pVariable`
//! bindings; a Converter additionally holds `FormulaTo`/`FormulaFrom` to map
//! between the feature's own value and the device register it wraps.

use std::collections::HashMap;

use crate::expr::{EvalError, Program};

/// A single `pVariable` binding: the local name used inside the formula and
/// the graph node name it resolves to.
#[derive(Debug, Clone)]
pub struct VariableBinding {
    pub local_name: String,
    pub node_name: String,
}

/// Compiled formula plus its variable bindings, shared by SwissKnife and the
/// three formula slots of a Converter.
#[derive(Debug, Clone)]
pub struct Formula {
    program: Program,
    variables: Vec<VariableBinding>,
}

impl Formula {
    pub fn compile(source: &str, variables: Vec<VariableBinding>) -> Result<Self, EvalError> {
        Ok(Formula {
            program: Program::compile(source)?,
            variables,
        })
    }

    pub fn variables(&self) -> &[VariableBinding] {
        &self.variables
    }

    pub fn source(&self) -> &str {
        self.program.source()
    }

    pub fn eval_float(&self, resolved: &HashMap<String, f64>) -> Result<f64, EvalError> {
        self.program.eval_float(resolved)
    }

    pub fn eval_int(&self, resolved: &HashMap<String, i64>) -> Result<i64, EvalError> {
        self.program.eval_int(resolved)
    }
}

/// A `SwissKnife`/`IntSwissKnife` node: one formula, read-only.
#[derive(Debug, Clone)]
pub struct SwissKnife {
    pub formula: Formula,
}

/// A `Converter`/`IntConverter` node: bidirectional mapping between the
/// feature-visible value and the underlying register/feature it wraps.
#[derive(Debug, Clone)]
pub struct Converter {
    /// Maps device value -> feature value (used on read).
    pub formula_to: Formula,
    /// Maps feature value -> device value (used on write).
    pub formula_from: Formula,
    /// The node name this converter drives.
    pub target_node: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::trace;

    #[test]
    fn swissknife_evaluates_bound_variables() {
        let vars = vec![VariableBinding {
            local_name: "A".into(),
            node_name: "Width".into(),
        }];
        let knife = SwissKnife {
            formula: Formula::compile("(A + 2) * 3", vars).expect("compile"),
        };
        trace!(source = knife.formula.source(), "compiled swissknife");
        let mut resolved = HashMap::new();
        resolved.insert("A".to_string(), 4.0);
        let value = knife.formula.eval_float(&resolved).expect("eval");
        assert!((value - 18.0).abs() < 1e-9);
    }

    #[test]
    fn converter_round_trips_through_formulas() {
        let converter = Converter {
            formula_to: Formula::compile("FROM / 1000", vec![VariableBinding {
                local_name: "FROM".into(),
                node_name: "RawExposure".into(),
            }])
            .expect("compile to"),
            formula_from: Formula::compile("TO * 1000", vec![VariableBinding {
                local_name: "TO".into(),
                node_name: "ExposureTime".into(),
            }])
            .expect("compile from"),
            target_node: "RawExposure".into(),
        };
        let mut device_side = HashMap::new();
        device_side.insert("FROM".to_string(), 5000.0);
        let feature_value = converter.formula_to.eval_float(&device_side).expect("to");
        assert!((feature_value - 5.0).abs() < 1e-9);

        let mut feature_side = HashMap::new();
        feature_side.insert("TO".to_string(), feature_value);
        let device_value = converter.formula_from.eval_float(&feature_side).expect("from");
        assert!((device_value - 5000.0).abs() < 1e-9);
    }
}
