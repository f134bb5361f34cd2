//! Text rendering of device replies.

use powerstrip::units::{amps, cost_dollars, kwh, watts};
use powerstrip::{EnergyReply, StatusReply, SENSED_SOCKETS};

/// Price used when none is configured, cents per kWh.
pub const DEFAULT_CENTS_PER_KWH: f64 = 9.0;

pub fn status_lines(status: &StatusReply) -> Vec<String> {
    (0..SENSED_SOCKETS)
        .map(|i| {
            let current = status.currents[i];
            format!(
                "Socket {}: {}, {:.3}A, {:.3}W",
                i + 1,
                if status.is_on(i) { "ON" } else { "OFF" },
                amps(current),
                watts(current)
            )
        })
        .collect()
}

pub fn energy_lines(energy: &EnergyReply, cents_per_kwh: f64) -> Vec<String> {
    let mut lines = Vec::with_capacity(SENSED_SOCKETS + 1);
    let mut total = 0.0;
    for (i, joules) in energy.joules.iter().take(SENSED_SOCKETS).enumerate() {
        let kwh = kwh(*joules);
        total += kwh;
        lines.push(format!(
            "Socket {}: {:.4}kWh, ${:.4}",
            i + 1,
            kwh,
            cost_dollars(kwh, cents_per_kwh)
        ));
    }
    lines.push(format!(
        "   Total: {:.4}kWh, ${:.4}",
        total,
        cost_dollars(total, cents_per_kwh)
    ));
    lines
}

/// `energy used during the past 3 hours:`
pub fn trailing_heading(count: u32, unit: &str) -> String {
    format!(
        "energy used during the past {} {}{}:",
        count,
        unit,
        if count > 1 { "s" } else { "" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_shows_sensed_sockets_only() {
        let lines = status_lines(&StatusReply {
            sockets: 0b1001,
            currents: [500, 0, 1234, 0],
        });
        assert_eq!(
            lines,
            vec![
                "Socket 1: ON, 0.500A, 60.000W",
                "Socket 2: OFF, 0.000A, 0.000W",
                "Socket 3: OFF, 1.234A, 148.080W",
            ]
        );
    }

    #[test]
    fn energy_with_cost() {
        let lines = energy_lines(
            &EnergyReply {
                joules: [43_200, 3_600_000, 0, 0],
            },
            DEFAULT_CENTS_PER_KWH,
        );
        assert_eq!(lines[0], "Socket 1: 0.0120kWh, $0.0011");
        assert_eq!(lines[1], "Socket 2: 1.0000kWh, $0.0900");
        assert_eq!(lines[3], "   Total: 1.0120kWh, $0.0911");
    }

    #[test]
    fn heading_plural() {
        assert_eq!(trailing_heading(1, "day"), "energy used during the past 1 day:");
        assert_eq!(trailing_heading(2, "week"), "energy used during the past 2 weeks:");
    }
}
