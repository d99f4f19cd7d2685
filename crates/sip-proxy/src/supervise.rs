// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::any::Any;
use std::future::Future;

use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::error::TaskError;

/// Runs `work` in its own task and swallows whatever it ends with.
///
/// A normal return is discarded. A reported SIP error or fault is logged, and
/// so is a panic. The returned handle always completes with `()`, so awaiting
/// it never fails because of `work`.
pub fn launch<F>(label: &'static str, work: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    let inner = tokio::spawn(work);
    tokio::spawn(async move {
        match inner.await {
            Ok(Ok(())) => {}
            Ok(Err(TaskError::Sip { status, reason })) => {
                error!(task = label, status, %reason, "task ended with SIP error");
            }
            Ok(Err(TaskError::Fault(err))) => {
                error!(task = label, error = ?err, "task failed");
            }
            Err(join) if join.is_panic() => {
                let panic = join.into_panic();
                error!(task = label, fault = %panic_message(panic.as_ref()), "task panicked");
            }
            Err(join) => {
                warn!(task = label, %join, "task cancelled");
            }
        }
    })
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
