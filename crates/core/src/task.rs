// Background task guard
//
// Background work runs detached from the request that started it. A panic in
// such a task must still let the caller mark the owning aggregate failed.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

/// Await `fut`, turning a panic into an error that carries the panic message
pub async fn catch_panic<F, T>(fut: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(anyhow::anyhow!("task panicked: {}", panic_message(&panic))),
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_results_through() {
        let ok = catch_panic(async { Ok::<_, anyhow::Error>(7) }).await.unwrap();
        assert_eq!(ok, 7);

        let err = catch_panic(async { Err::<(), _>(anyhow::anyhow!("boom")) })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let err = catch_panic(async {
            if true {
                panic!("analysis exploded");
            }
            Ok::<(), anyhow::Error>(())
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("analysis exploded"));
    }
}
