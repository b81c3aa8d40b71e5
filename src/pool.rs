use bytes::BytesMut;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Default number of idle items a pool keeps around.
pub(crate) const DEFAULT_POOL_CAPACITY: usize = 64;

/// Default largest allocation, in bytes, a pool takes back.
pub(crate) const DEFAULT_MAX_RETAINED: usize = 64 * 1024;

/// Returns a released value to its pristine state.
pub trait Reset {
    /// Clears any content left over from the previous owner.
    fn reset(&mut self);

    /// Bytes held by the value's allocation.
    fn retained(&self) -> usize;
}

impl Reset for BytesMut {
    fn reset(&mut self) {
        self.clear();
    }

    fn retained(&self) -> usize {
        self.capacity()
    }
}

impl Reset for Vec<u8> {
    fn reset(&mut self) {
        self.clear();
    }

    fn retained(&self) -> usize {
        self.capacity()
    }
}

/// A bounded stack of reusable values shared between requests.
///
/// A value handed out by [`acquire`](Pool::acquire) belongs to the caller
/// until it is given back with [`release`](Pool::release), which resets it
/// first. Values beyond the capacity, or holding more than the retention
/// limit, are dropped on release.
pub struct Pool<T> {
    idle: Mutex<Vec<T>>,
    capacity: usize,
    max_retained: usize,
}

impl<T: Default + Reset> Pool<T> {
    /// Creates an empty pool keeping at most `capacity` idle values.
    pub fn new(capacity: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            capacity,
            max_retained: DEFAULT_MAX_RETAINED,
        }
    }

    /// Drops released values whose allocation exceeds `bytes`.
    pub fn with_max_retained(mut self, bytes: usize) -> Self {
        self.max_retained = bytes;
        self
    }

    /// Takes an idle value, or creates a fresh one.
    pub fn acquire(&self) -> T {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default()
    }

    /// Resets `value` and makes it available again.
    pub fn release(&self, mut value: T) {
        if value.retained() > self.max_retained {
            return;
        }
        value.reset();
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.capacity {
            idle.push(value);
        }
    }

    /// Number of idle values.
    pub fn idle(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl<T: Default + Reset> Default for Pool<T> {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.capacity)
            .field("max_retained", &self.max_retained)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_resets_value() {
        let pool: Pool<BytesMut> = Pool::new(4);
        let mut buf = pool.acquire();
        buf.extend_from_slice(b"left over");
        pool.release(buf);

        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 9);
    }

    #[test]
    fn test_capacity_bounds_idle_values() {
        let pool: Pool<Vec<u8>> = Pool::new(2);
        for _ in 0..5 {
            pool.release(Vec::with_capacity(8));
        }
        assert_eq!(pool.idle(), 2);

        let _a = pool.acquire();
        let _b = pool.acquire();
        assert_eq!(pool.idle(), 0);
        // empty pool still hands out values
        assert!(pool.acquire().is_empty());
    }

    #[test]
    fn test_oversized_values_are_dropped() {
        let pool: Pool<BytesMut> = Pool::new(4).with_max_retained(1024);
        pool.release(BytesMut::with_capacity(1 << 20));
        assert_eq!(pool.idle(), 0);

        pool.release(BytesMut::with_capacity(512));
        assert_eq!(pool.idle(), 1);
        assert!(pool.acquire().capacity() <= 1024);
    }

    #[test]
    fn test_shared_between_threads() {
        let pool: std::sync::Arc<Pool<Vec<u8>>> = std::sync::Arc::new(Pool::new(16));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let pool = std::sync::Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let mut v = pool.acquire();
                        assert!(v.is_empty());
                        v.push(i);
                        pool.release(v);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(pool.idle() <= 16);
    }
}
