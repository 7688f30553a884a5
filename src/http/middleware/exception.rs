//! Exception containment.
//!
//! The single place where an unhandled fault becomes a response: any `Err`
//! or panic from the inner chain is logged with the request path and turned
//! into the generic 500 JSON body.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::future::{BoxFuture, FutureExt};

use crate::error::GatewayError;
use crate::http::pipeline::{Next, RequestContext, Stage, StageResult};
use crate::http::response::internal_error;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionContainmentStage;

impl Stage for ExceptionContainmentStage {
    fn name(&self) -> &'static str {
        "exception_containment"
    }

    fn handle<'a>(

        &'a self,

        ctx: &'a mut RequestContext,

        next: Next<'a>,

    ) -> BoxFuture<'a, StageResult> {
        async move {
            let result = AssertUnwindSafe(next.run(&mut *ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    Err(GatewayError::Panic(panic_message(payload.as_ref())))
                });

            match result {
                Ok(response) => Ok(response),
                Err(fault) => {
                    tracing::error!(
                        request_id = %ctx.request_id(),
                        method = %ctx.method(),
                        path = %ctx.path(),
                        error = %fault,
                        "Unhandled fault while processing request"
                    );
                    Ok(internal_error(fault.to_string()))
                }
            }
        }
        .boxed()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
