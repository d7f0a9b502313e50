/*! Sharing a stack between tasks.

A [Stack] is manipulated through `&mut self`, which is all the exclusion a
single task needs. [SharedStack] puts it behind a spinning mutex so that an
input path, an output path and a timer task can all reach it; the guard
unlocks on every exit path, early returns included.

```rust
use smolnd::iface::{DeviceConfig, DeviceIndex, Egress, LinkAddr, ETHERNET};
use smolnd::sync::SharedStack;
use smolnd::time::Instant;
use smolnd::wire::Ipv6Repr;

struct Driver;

impl Egress for Driver {
    fn send_icmpv6(&mut self, _: DeviceIndex, _: &Ipv6Repr, _: &[u8]) -> smolnd::Result<()> {
        Ok(())
    }
    fn transmit(&mut self, _: DeviceIndex, _: &LinkAddr, _: &[u8]) -> smolnd::Result<()> {
        Ok(())
    }
}

let shared = SharedStack::new(Driver, Instant::ZERO, 0x5eed);
let mac = LinkAddr::from_ethernet([0x02, 0, 0, 0, 0, 1]);
let dev = shared
    .with(|stack| stack.add_device(DeviceConfig::new(&ETHERNET).hardware_addr(mac)))
    .unwrap();
shared.with(|stack| stack.poll(Instant::from_secs(1)));
assert!(shared.lock().device(dev).is_some());
```
*/

use spin::{Mutex, MutexGuard};

use crate::iface::{Egress, Stack};
use crate::time::Instant;

/// A [Stack] behind a spinning mutex.
#[derive(Debug)]
pub struct SharedStack<E: Egress> {
    inner: Mutex<Stack<E>>,
}

impl<E: Egress> SharedStack<E> {
    /// Create a shared stack, see [Stack::new].
    pub fn new(egress: E, now: Instant, random_seed: u64) -> Self {
        Self::from_stack(Stack::new(egress, now, random_seed))
    }

    pub const fn from_stack(stack: Stack<E>) -> Self {
        Self {
            inner: Mutex::new(stack),
        }
    }

    /// Lock the stack, spinning until it is available.
    pub fn lock(&self) -> MutexGuard<'_, Stack<E>> {
        self.inner.lock()
    }

    /// Lock the stack if nobody else holds it.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, Stack<E>>> {
        self.inner.try_lock()
    }

    /// Run `f` with the stack locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut Stack<E>) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn into_inner(self) -> Stack<E> {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tests::*;

    #[test]
    fn test_lock_released_on_error() {
        let shared = SharedStack::new(MockEgress::default(), Instant::ZERO, 1);
        let result = shared.with(|stack| stack.remove_address(DeviceIndex::new(9), &MOCK_GLOBAL_ADDR));
        assert_eq!(result, Err(Error::InvalidParam));
        assert!(shared.try_lock().is_some());
    }

    #[test]
    fn test_try_lock_contended() {
        let shared = SharedStack::new(MockEgress::default(), Instant::ZERO, 1);
        let guard = shared.lock();
        assert!(shared.try_lock().is_none());
        drop(guard);

        let dev = shared.with(|stack| stack.add_device(loopback_config())).unwrap();
        let stack = shared.into_inner();
        assert!(stack.device(dev).is_some());
    }
}
