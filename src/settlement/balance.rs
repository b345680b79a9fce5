//! Balance arithmetic for one agent-day.
//!
//! Pure, no I/O, no hidden state: both settlement paths feed their gathered
//! inputs through here so a batch run and an event-triggered recompute can
//! never disagree on the math.

/// Inputs to one day's balance computation. `prior_balance` may be any sign;
/// the rest are non-negative totals gathered upstream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceInput {
    pub prior_balance: f64,
    pub wagered: f64,
    pub commission: f64,
    pub prizes: f64,
    pub payments: f64,
    pub collections: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceResult {
    pub prior_balance: f64,
    /// wagered − commission − prizes.
    pub day_movement: f64,
    /// Rounded to the cent, half away from zero. The only rounding in the
    /// whole pipeline; intermediate terms are carried at full precision.
    pub new_balance: f64,
}

/// Round to two decimals, half away from zero.
///
/// Decimal halves usually sit just below .5 in binary (10.005 is stored as
/// 10.00499…), so the scaled value is nudged toward its sign before
/// `f64::round` to keep `round2(10.005) == 10.01` and
/// `round2(-10.005) == -10.01`.
pub fn round2(value: f64) -> f64 {
    let scaled = value * 100.0;
    let nudged = scaled + scaled.signum() * 1e-7;
    nudged.round() / 100.0
}

/// Compute the day's movement and the new running balance.
pub fn settle(input: &BalanceInput) -> BalanceResult {
    let day_movement = input.wagered - input.commission - input.prizes;
    let new_balance = round2(
        input.prior_balance + day_movement + input.payments - input.collections,
    );
    BalanceResult {
        prior_balance: input.prior_balance,
        day_movement,
        new_balance,
    }
}
