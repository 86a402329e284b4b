use crate::grammar::Obis;
use lazy_static::lazy_static;
use std::collections::HashMap;

lazy_static! {
    static ref DESCRIPTIONS: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();

        // Version and identification
        map.insert("1-3:0.2.8", "DSMR version");
        map.insert("0-0:1.0.0", "Date and time");
        map.insert("0-0:96.1.1", "Equipment identifier");
        map.insert("0-0:96.1.4", "Version information (Belgium)");
        map.insert("0-0:96.14.0", "Tariff indicator");
        map.insert("0-0:96.13.0", "Text message");
        map.insert("0-0:96.13.1", "Text message code");
        map.insert("0-0:17.0.0", "Actual threshold electricity");
        map.insert("0-0:96.3.10", "Breaker state");

        // Energy values
        map.insert("1-0:1.8.1", "Electricity delivered to client (tariff 1)");
        map.insert("1-0:1.8.2", "Electricity delivered to client (tariff 2)");
        map.insert("1-0:2.8.1", "Electricity delivered by client (tariff 1)");
        map.insert("1-0:2.8.2", "Electricity delivered by client (tariff 2)");

        // Power values
        map.insert("1-0:1.7.0", "Actual electricity power delivered (+P)");
        map.insert("1-0:2.7.0", "Actual electricity power received (-P)");
        map.insert("1-0:21.7.0", "Instantaneous active power L1 (+P)");
        map.insert("1-0:41.7.0", "Instantaneous active power L2 (+P)");
        map.insert("1-0:61.7.0", "Instantaneous active power L3 (+P)");
        map.insert("1-0:22.7.0", "Instantaneous active power L1 (-P)");
        map.insert("1-0:42.7.0", "Instantaneous active power L2 (-P)");
        map.insert("1-0:62.7.0", "Instantaneous active power L3 (-P)");

        // Voltage and current
        map.insert("1-0:32.7.0", "Instantaneous voltage L1");
        map.insert("1-0:52.7.0", "Instantaneous voltage L2");
        map.insert("1-0:72.7.0", "Instantaneous voltage L3");
        map.insert("1-0:31.7.0", "Instantaneous current L1");
        map.insert("1-0:51.7.0", "Instantaneous current L2");
        map.insert("1-0:71.7.0", "Instantaneous current L3");

        // Power quality
        map.insert("0-0:96.7.21", "Number of power failures in any phase");
        map.insert("0-0:96.7.9", "Number of long power failures in any phase");
        map.insert("1-0:99.97.0", "Power failure event log");
        map.insert("1-0:32.32.0", "Number of voltage sags (L1)");
        map.insert("1-0:52.32.0", "Number of voltage sags (L2)");
        map.insert("1-0:72.32.0", "Number of voltage sags (L3)");
        map.insert("1-0:32.36.0", "Number of voltage swells (L1)");
        map.insert("1-0:52.36.0", "Number of voltage swells (L2)");
        map.insert("1-0:72.36.0", "Number of voltage swells (L3)");

        // M-Bus devices, gas on channel 1
        map.insert("0-1:24.1.0", "Device type");
        map.insert("0-1:96.1.0", "Equipment identifier (gas)");
        map.insert("0-1:24.2.1", "Last 5-minute value (gas)");
        map.insert("0-1:24.3.0", "Last hourly value (gas, DSMR 2.2)");
        map.insert("0-1:24.4.0", "Gas valve position");

        map
    };
}

/// Human readable name of a well known DSMR OBIS code.
pub fn get_obis_description(obis_code: &str) -> Option<&'static str> {
    DESCRIPTIONS.get(obis_code).copied()
}

/// Checks the `A-B:C.D.E` form used as key in telegrams.
pub fn validate_obis_code(code: &str) -> bool {
    code.parse::<Obis>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_obis_code() {
        assert!(validate_obis_code("1-0:1.8.1"));
        assert!(validate_obis_code("0-0:1.0.0"));
        assert!(validate_obis_code("1-0:99.97.0"));
        assert!(!validate_obis_code("invalid"));
        assert!(!validate_obis_code("1:2.3.4"));
        assert!(!validate_obis_code("1-0:1.8"));
        assert!(!validate_obis_code("1-0:1.8.1*255"));
    }

    #[test]
    fn test_get_obis_description() {
        assert_eq!(get_obis_description("0-0:96.1.1"), Some("Equipment identifier"));
        assert_eq!(get_obis_description("1-0:99.97.0"), Some("Power failure event log"));
        assert_eq!(get_obis_description("nonexistent"), None);
    }
}
