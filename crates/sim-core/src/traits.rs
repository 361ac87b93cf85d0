use rand::{Rng, RngCore};

/// Source of uniform draws in `[0, 1)`.
///
/// Every `rand` generator is a source, so tests seed a `StdRng` and
/// production code can plug in whichever generator it prefers.
pub trait RandomSource {
    fn draw(&mut self) -> f64;
}

impl<R: RngCore + ?Sized> RandomSource for R {
    fn draw(&mut self) -> f64 {
        self.gen::<f64>()
    }
}
