use std::cmp::Ordering;

use tracing::info;

use crate::error::{LeverageError, RejectionReason, Result, RouteRejection};
use crate::route_simulator::SimulatedRoute;

/// Output guaranteed per unit of input. Compared by cross-multiplication so
/// no precision is lost.
fn compare_rates<T>(a: &SimulatedRoute<T>, b: &SimulatedRoute<T>) -> Ordering {
  let a_rate = u128::from(a.route.min_out_amount_lamports)
    * u128::from(b.route.input_amount_lamports);
  let b_rate = u128::from(b.route.min_out_amount_lamports)
    * u128::from(a.route.input_amount_lamports);
  a_rate.cmp(&b_rate)
}

/// Picks the simulated route with the best guaranteed rate among those whose
/// minimum output covers `required_output`.
///
/// Ties go to the earliest route. Returns the winner and every rejection,
/// ordered by route index.
///
/// # Errors
/// - [`LeverageError::NoRouteAvailable`] when nothing survives
pub fn select_route<T>(
  survivors: Vec<SimulatedRoute<T>>,
  required_output: u64,
  mut rejections: Vec<RouteRejection>,
) -> Result<(SimulatedRoute<T>, Vec<RouteRejection>)> {
  let mut best: Option<SimulatedRoute<T>> = None;
  for candidate in survivors {
    let guaranteed = candidate.route.min_out_amount_lamports;
    if guaranteed < required_output {
      rejections.push(RouteRejection {
        route_index: candidate.route_index,
        reason: RejectionReason::InsufficientOutput {
          guaranteed,
          required: required_output,
        },
      });
      continue;
    }
    best = match best {
      Some(current)
        if compare_rates(&candidate, &current) != Ordering::Greater =>
      {
        Some(current)
      }
      _ => Some(candidate),
    };
  }
  rejections.sort_by_key(|r| r.route_index);
  match best {
    Some(route) => {
      info!(
        route = route.route_index,
        input = route.route.input_amount_lamports,
        min_out = route.route.min_out_amount_lamports,
        rejected = rejections.len(),
        "route selected"
      );
      Ok((route, rejections))
    }
    None => Err(LeverageError::NoRouteAvailable { rejections }),
  }
}
