//! Mock construction helpers

use crossbeam_channel::{bounded, Receiver, Sender};
use mockall::mock;
use modflow::kernel::{ConnectorRef, ModuleNotifier};

mock! {
    pub Notifier {}

    impl ModuleNotifier for Notifier {
        fn connection_established(&self, here: &ConnectorRef, there: &ConnectorRef);
        fn connection_closed(&self, here: &ConnectorRef, there: &ConnectorRef);
        fn data_changed(&self, input: &ConnectorRef, output: &ConnectorRef);
    }
}

/// Create a test channel with default size
pub fn create_test_channel<T>() -> (Sender<T>, Receiver<T>) {
    bounded(16)
}
