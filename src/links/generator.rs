use rand::RngExt;

/// Source of candidate short codes
pub trait CodeGenerator: Send + Sync {
    /// Produce a candidate of exactly `length` characters
    fn generate(&self, length: usize) -> String;
}

/// Uniformly random lowercase ASCII codes
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self, length: usize) -> String {
        let mut rng = rand::rng();
        (0..length)
            .map(|_| char::from(rng.random_range(b'a'..=b'z')))
            .collect()
    }
}
