//! A mock channel sender for testing routing without a network.

use jwquant_notify::core::Notifier;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
}

#[derive(Clone, Debug)]
pub struct MockNotifier {
    pub name: String,
    pub behavior: Behavior,
    pub sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockNotifier {
    pub fn new(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn succeeding(name: &str) -> Arc<Self> {
        Arc::new(Self::new(name, Behavior::Succeed))
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for MockNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, title: &str, body: &str) -> bool {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        match self.behavior {
            Behavior::Succeed => true,
            Behavior::Fail => false,
            Behavior::Panic => panic!("mock channel {} exploded", self.name),
        }
    }
}
