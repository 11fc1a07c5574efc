//! String-keyed objective factory table.
//!
//! Objectives are instantiated by name at startup from a registry populated
//! with the built-in implementations; callers can register their own
//! factories before dispatch. No reflective loading.

use std::collections::HashMap;

use crate::driver::{DriverError, InputParams};
use crate::io;
use crate::objective::DualObjective;
use crate::objectives::simple::CenteredQuadratic;
use crate::objectives::separable_qp::SeparableQpObjective;
use crate::objectives::ProjectionType;

/// Everything a factory needs to build an objective.
pub struct ObjectiveContext<'a> {
    pub gamma: f64,
    pub projection: ProjectionType,
    pub input: &'a InputParams,
    /// Pass-through arguments the driver did not interpret.
    pub args: &'a [String],
}

/// Factory signature: build an objective from the context.
pub type ObjectiveFactory =
    fn(&ObjectiveContext<'_>) -> Result<Box<dyn DualObjective>, DriverError>;

/// The factory table.
pub struct Registry {
    table: HashMap<String, ObjectiveFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Registry pre-populated with the built-in objectives.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("SeparableQpObjective", build_separable_qp);
        registry.register("CenteredQuadratic", build_centered_quadratic);
        registry
    }

    pub fn register(&mut self, name: &str, factory: ObjectiveFactory) {
        self.table.insert(name.to_string(), factory);
    }

    /// Resolve a class name. A miss is fatal and lists the known names.
    pub fn create(
        &self,
        name: &str,
        context: &ObjectiveContext<'_>,
    ) -> Result<Box<dyn DualObjective>, DriverError> {
        match self.table.get(name) {
            Some(factory) => factory(context),
            None => {
                let mut known: Vec<&str> = self.table.keys().map(String::as_str).collect();
                known.sort_unstable();
                Err(DriverError::ObjectiveLoad {
                    class: name.to_string(),
                    known: known.join(", "),
                })
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn build_separable_qp(
    context: &ObjectiveContext<'_>,
) -> Result<Box<dyn DualObjective>, DriverError> {
    let blocks_path = context.input.blocks_path.as_deref().ok_or_else(|| {
        DriverError::InvalidArgument("SeparableQpObjective requires a block table path".into())
    })?;
    let b_path = context.input.vector_b_path.as_deref().ok_or_else(|| {
        DriverError::InvalidArgument("SeparableQpObjective requires a constraint vector path".into())
    })?;

    let blocks = io::load_blocks(blocks_path)?;
    let b = io::load_vector_b(b_path, context.input.format)?;
    let objective = SeparableQpObjective::new(blocks, b, context.gamma, context.projection)
        .map_err(DriverError::InvalidArgument)?;
    Ok(Box::new(objective))
}

/// Center parsed from the pass-through arguments:
/// `--objective.center 3.0,-2.0`.
fn build_centered_quadratic(
    context: &ObjectiveContext<'_>,
) -> Result<Box<dyn DualObjective>, DriverError> {
    let mut args = context.args.iter();
    let center = loop {
        match args.next() {
            Some(flag) if flag == "--objective.center" => break args.next(),
            Some(_) => continue,
            None => break None,
        }
    };
    let center = center.ok_or_else(|| {
        DriverError::InvalidArgument("CenteredQuadratic requires --objective.center".into())
    })?;
    let parsed: Result<Vec<f64>, _> = center.split(',').map(|f| f.trim().parse::<f64>()).collect();
    let parsed = parsed.map_err(|e| {
        DriverError::InvalidArgument(format!("bad --objective.center `{}`: {}", center, e))
    })?;
    Ok(Box::new(CenteredQuadratic::new(parsed)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::TableFormat;

    fn context<'a>(input: &'a InputParams, args: &'a [String]) -> ObjectiveContext<'a> {
        ObjectiveContext {
            gamma: 1e-3,
            projection: ProjectionType::Simplex,
            input,
            args,
        }
    }

    #[test]
    fn test_unknown_class_lists_known_names() {
        let input = InputParams {
            blocks_path: None,
            vector_b_path: None,
            format: TableFormat::Json,
        };
        let registry = Registry::with_builtins();
        let err = registry
            .create("NoSuchObjective", &context(&input, &[]))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("NoSuchObjective"));
        assert!(message.contains("SeparableQpObjective"));
        assert!(message.contains("CenteredQuadratic"));
    }

    #[test]
    fn test_centered_quadratic_from_args() {
        let input = InputParams {
            blocks_path: None,
            vector_b_path: None,
            format: TableFormat::Json,
        };
        let args = vec!["--objective.center".to_string(), "3.0,-5.0".to_string()];
        let registry = Registry::with_builtins();
        let objective = registry
            .create("CenteredQuadratic", &context(&input, &args))
            .unwrap();
        assert_eq!(objective.dual_dimensionality(), 2);
    }
}
