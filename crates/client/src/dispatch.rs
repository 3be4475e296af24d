use bytes::Bytes;
use tokio::runtime::Handle;

/// Response callback. Invoked exactly once per accepted query.
pub type Callback = Box<dyn FnOnce(Bytes) + Send + 'static>;

/// Moves response callbacks off the task that received the response.
pub trait Dispatcher: Send + Sync + 'static {
    fn dispatch(&self, callback: Callback, response: Bytes);
}

/// Runs callbacks as tasks on a tokio runtime.
#[derive(Clone, Debug)]
pub struct RuntimeDispatcher {
    handle: Handle,
}

impl RuntimeDispatcher {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Dispatch onto the runtime the caller is running on.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Dispatcher for RuntimeDispatcher {
    fn dispatch(&self, callback: Callback, response: Bytes) {
        self.handle.spawn(async move { callback(response) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_runtime_dispatcher_runs_callback() {
        let (tx, rx) = oneshot::channel();
        let dispatcher = RuntimeDispatcher::current();

        dispatcher.dispatch(
            Box::new(move |response| {
                let _ = tx.send(response);
            }),
            Bytes::from_static(b"hello"),
        );

        assert_eq!(rx.await.unwrap(), Bytes::from_static(b"hello"));
    }
}
