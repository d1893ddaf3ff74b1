//! Payload validation applied before a write is accepted.
//!
//! CIDs and tokens are already well-formed by construction; what is left
//! are the range checks that depend on configuration.

use super::config::QueueConfig;
use super::errors::QueueError;
use shared_types::{WritePayload, WriteRequest};

pub fn validate_request(request: &WriteRequest, config: &QueueConfig) -> Result<(), QueueError> {
    if !request.payload().fits(&request.key().record_type) {
        return Err(QueueError::InvalidPayload(format!(
            "{} payload cannot be written to {}",
            request.payload().kind_name(),
            request.key()
        )));
    }

    match request.payload() {
        WritePayload::Document { .. } => Ok(()),
        WritePayload::CarbonEmission {
            total_emissions,
            unit,
        } => {
            if *total_emissions == 0 {
                return Err(QueueError::InvalidPayload(
                    "totalEmissions must be a positive integer".into(),
                ));
            }
            if *total_emissions > config.max_emission {
                return Err(QueueError::InvalidPayload(format!(
                    "totalEmissions {} exceeds maximum {}",
                    total_emissions, config.max_emission
                )));
            }
            let unit = unit.trim();
            if unit.is_empty() || unit.len() > config.max_unit_len {
                return Err(QueueError::InvalidPayload(format!(
                    "unit must be 1 to {} characters",
                    config.max_unit_len
                )));
            }
            if !config.allowed_units.is_empty() && !config.allowed_units.iter().any(|u| u == unit)
            {
                return Err(QueueError::InvalidPayload(format!(
                    "unsupported unit {unit:?}, expected one of {}",
                    config.allowed_units.join(", ")
                )));
            }
            Ok(())
        }
    }
}
