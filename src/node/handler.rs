use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased async method handler.
///
/// Takes the encoded argument value from a request envelope and produces an
/// encoded result, so handlers of different typed signatures share one table.
pub(super) trait MethodFn: Send + Sync {
    fn invoke(&self, args: Value) -> BoxFuture<'static, Result<Value>>;
}

/// Shared handler pointer; cheap to clone when spawning per-request tasks.
pub(super) type BoxedMethod = Arc<dyn MethodFn>;

struct Method<F, Fut, Req, Resp>
where
    F: Fn(Req) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Resp>> + Send,
    Req: DeserializeOwned,
    Resp: Serialize,
{
    func: F,
    _phantom: PhantomData<fn(Req, Resp, Fut)>,
}

impl<F, Fut, Req, Resp> MethodFn for Method<F, Fut, Req, Resp>
where
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp>> + Send + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
{
    fn invoke(&self, args: Value) -> BoxFuture<'static, Result<Value>> {
        // Argument decode failures become handler faults on the wire; the
        // caller sees the description, not a serialization error of its own.
        let req: Req = match serde_json::from_value(args) {
            Ok(req) => req,
            Err(err) => return Box::pin(async move { Err(err.into()) }),
        };

        let fut = (self.func)(req);

        Box::pin(async move {
            let resp = fut.await?;
            Ok(serde_json::to_value(resp)?)
        })
    }
}

/// Wrap a typed handler into a table-storable [`BoxedMethod`].
pub(super) fn wrap_method<F, Fut, Req, Resp>(func: F) -> BoxedMethod
where
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp>> + Send + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
{
    // ---
    Arc::new(Method {
        func,
        _phantom: PhantomData,
    })
}
