use std::{
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};
use tokio::time::{self, Instant};

/// A cheaply cloneable, shared mutable value. Readers and writers take the
/// lock only for the duration of the closure.
pub struct State<T> {
    state: Arc<RwLock<T>>,
}

impl<T> State<T> {
    pub fn new(state: T) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn read<F, K>(&self, f: F) -> Result<K, PoisonError<RwLockReadGuard<'_, T>>>
    where
        F: FnOnce(&T) -> K,
    {
        let value = self.state.read()?;
        Ok(f(&value))
    }

    pub fn write<F>(&self, f: F) -> Result<(), PoisonError<RwLockWriteGuard<'_, T>>>
    where
        F: FnOnce(&mut T),
    {
        let mut value = self.state.write()?;
        f(&mut value);
        Ok(())
    }
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

/// Retries `f` with a fixed backoff until it succeeds or `timeout` elapses,
/// returning the last error on timeout.
pub async fn retry_for<F, K, E>(timeout: Duration, backoff: Duration, f: F) -> Result<K, E>
where
    F: AsyncFn() -> Result<K, E>,
{
    let start = Instant::now();

    loop {
        match f().await {
            Err(e) => {
                if start.elapsed() >= timeout {
                    return Err(e);
                }

                time::sleep(backoff).await;
            }

            Ok(m) => return Ok(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_read_write() {
        let s = State::new(0_i32);
        s.write(|v| *v += 1).unwrap();
        assert_eq!(s.read(|v| *v).unwrap(), 1);
    }

    #[tokio::test]
    async fn retry_for_succeeds_before_timeout() {
        let attempts = State::new(0_u32);
        let result: Result<&str, &str> = retry_for(
            Duration::from_millis(200),
            Duration::from_millis(5),
            || {
                let attempts = attempts.clone();
                async move {
                    let n = attempts.read(|v| *v).unwrap();
                    attempts.write(|v| *v += 1).unwrap();
                    if n < 2 {
                        Err("not yet")
                    } else {
                        Ok("done")
                    }
                }
            },
        )
        .await;
        assert_eq!(result, Ok("done"));
    }
}
