//! Test data builders for creating test graphs

use modflow::kernel::{
    ConnectorRef, Module, ModuleContainer, ModuleNotifier, NoopNotifier, TransferType,
};
use std::sync::Arc;

/// Builder for creating test modules
pub struct ModuleBuilder {
    name: String,
    notifier: Arc<dyn ModuleNotifier>,
    inputs: Vec<(String, Option<TransferType>)>,
    outputs: Vec<(String, Option<TransferType>)>,
}

impl ModuleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            notifier: Arc::new(NoopNotifier),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn notifier(mut self, notifier: Arc<dyn ModuleNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn input(mut self, name: &str) -> Self {
        self.inputs.push((name.to_string(), None));
        self
    }

    pub fn typed_input<T: 'static>(mut self, name: &str) -> Self {
        self.inputs
            .push((name.to_string(), Some(TransferType::of::<T>())));
        self
    }

    pub fn output(mut self, name: &str) -> Self {
        self.outputs.push((name.to_string(), None));
        self
    }

    pub fn typed_output<T: 'static>(mut self, name: &str) -> Self {
        self.outputs
            .push((name.to_string(), Some(TransferType::of::<T>())));
        self
    }

    pub fn build(self) -> Arc<Module> {
        let module = Module::new(self.name, "test module", self.notifier);
        for (name, transfer) in self.inputs {
            module.add_input(&name, "", transfer).unwrap();
        }
        for (name, transfer) in self.outputs {
            module.add_output(&name, "", transfer).unwrap();
        }
        module
    }

    /// Build and add to `container`.
    pub fn build_in(self, container: &ModuleContainer) -> Arc<Module> {
        let module = self.build();
        container.add(module.clone()).unwrap();
        module
    }
}

/// Connector `name` of `module`.
pub fn connector(module: &Arc<Module>, name: &str) -> ConnectorRef {
    module.get_connector(name).unwrap()
}

/// One output `O` and two inputs `I1`, `I2` on separate modules.
pub struct FanOut {
    pub source: Arc<Module>,
    pub first: Arc<Module>,
    pub second: Arc<Module>,
    pub output: ConnectorRef,
    pub input1: ConnectorRef,
    pub input2: ConnectorRef,
}

impl FanOut {
    pub fn new() -> Self {
        let source = ModuleBuilder::new("source").output("O").build();
        let first = ModuleBuilder::new("first").input("I1").build();
        let second = ModuleBuilder::new("second").input("I2").build();
        let output = connector(&source, "O");
        let input1 = connector(&first, "I1");
        let input2 = connector(&second, "I2");
        Self {
            source,
            first,
            second,
            output,
            input1,
            input2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_builder() {
        let module = ModuleBuilder::new("test")
            .input("a")
            .typed_output::<f64>("b")
            .build();

        assert_eq!(module.name(), "test");
        assert_eq!(module.input_connectors().len(), 1);
        assert!(connector(&module, "b").transfer_type().unwrap().is::<f64>());
    }
}
