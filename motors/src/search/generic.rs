#[cfg(feature = "generic_negamax")]
pub mod generic_negamax;
#[cfg(feature = "naive_negamax")]
pub mod naive_slow_negamax;
#[cfg(feature = "random_mover")]
pub mod random_mover;
