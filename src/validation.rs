//! Named checks that gate risky reads, e.g. "is this really an ELF file". Rules are cheap to
//! build and are evaluated lazily; `check` answers a question while `check_throwing` is used
//! by accessors that can't continue unless the rule holds.
use crate::error::{FormatError, Result};

pub struct ValidationRule<'a> {
    name: &'static str,
    predicate: Box<dyn Fn() -> Result<bool> + 'a>,
    prerequisites: Vec<ValidationRule<'a>>,
}

impl<'a> ValidationRule<'a> {
    pub fn new(name: &'static str, predicate: impl Fn() -> Result<bool> + 'a) -> Self {
        ValidationRule {
            name,
            predicate: Box::new(predicate),
            prerequisites: Vec::new(),
        }
    }

    /// Adds a rule that must hold before this one is evaluated.
    pub fn requires(mut self, prerequisite: ValidationRule<'a>) -> Self {
        self.prerequisites.push(prerequisite);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// False if a prerequisite or the predicate fails. Malformed input reported while
    /// evaluating is treated as a failed check.
    pub fn check(&self) -> bool {
        match self.evaluate() {
            Ok(valid) => valid,
            Err(err) => {
                if err.is_expected() {
                    tracing::debug!(rule = self.name, %err, "validation failed");
                } else {
                    tracing::warn!(rule = self.name, %err, "validation failed unexpectedly");
                }
                false
            }
        }
    }

    /// Like check but failures are errors naming the rule that failed.
    pub fn check_throwing(&self) -> Result<()> {
        for prerequisite in self.prerequisites.iter() {
            prerequisite.check_throwing()?;
        }
        if (self.predicate)()? {
            Ok(())
        } else {
            Err(FormatError::bad_format(self.name))
        }
    }

    fn evaluate(&self) -> Result<bool> {
        for prerequisite in self.prerequisites.iter() {
            if !prerequisite.evaluate()? {
                return Ok(false);
            }
        }
        (self.predicate)()
    }
}
