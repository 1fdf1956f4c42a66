use std::time::Duration;

use futures::future::LocalBoxFuture;
use futures::stream::LocalBoxStream;

pub trait Timers {
    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;

    /// The first tick fires one full period after the call.
    fn interval(&self, period: Duration) -> LocalBoxStream<'static, ()>;
}
