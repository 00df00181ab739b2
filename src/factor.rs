//! Trial-division factorization.

use thiserror::Error;

use crate::status::Status;

/// Why a target could not be factored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FactorError {
    /// Negative targets have no prime factorization.
    #[error("Unable to factor {0}: target must not be negative")]
    InvalidInput(i32),
}

impl From<FactorError> for Status {
    fn from(err: FactorError) -> Self {
        match err {
            FactorError::InvalidInput(_) => Status::invalid_argument(err.to_string()),
        }
    }
}

/// Factor `target` into primes by trial division.
///
/// The factors are returned with multiplicity in non-decreasing order, so
/// their product is `target` for every `target >= 2`. `0` and `1` have no
/// prime factors and yield an empty list; negative targets are rejected.
///
/// ```
/// assert_eq!(simple_factors::prime_factors(360), Ok(vec![2, 2, 2, 3, 3, 5]));
/// assert_eq!(simple_factors::prime_factors(1), Ok(vec![]));
/// ```
pub fn prime_factors(target: i32) -> Result<Vec<i32>, FactorError> {
    if target < 0 {
        return Err(FactorError::InvalidInput(target));
    }

    let mut factors = Vec::new();
    let mut n = target;
    if n < 2 {
        return Ok(factors);
    }

    while n % 2 == 0 {
        factors.push(2);
        n /= 2;
    }

    // the bound follows n as it shrinks, widened so i * i cannot overflow
    let mut i = 3;
    while i64::from(i) * i64::from(i) <= i64::from(n) {
        while n % i == 0 {
            factors.push(i);
            n /= i;
        }
        i += 2;
    }

    // whatever survives the loop has no divisor below its square root
    if n > 2 {
        factors.push(n);
    }

    Ok(factors)
}
