#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use pubsub_connector::{callback, Callback, Value};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[ctor::ctor]
fn init_tests() {
    // テストの前に一度だけ tracing を初期化する
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

pub type CallLog = Arc<Mutex<Vec<(String, Vec<Value>)>>>;

/// Callbacks that record `(name, args)` into a shared log.
pub fn recorder() -> (CallLog, impl Fn(&str) -> Callback) {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let shared = log.clone();
    let make = move |name: &str| {
        let log = shared.clone();
        let name = name.to_string();
        callback(move |args| {
            log.lock().push((name.clone(), args.to_vec()));
            Ok(())
        })
    };
    (log, make)
}
