#![no_main]

use libfuzzer_sys::fuzz_target;
use perfguard::config::EngineConfig;
use perfguard::ledger::HistoryLedger;
use perfguard::response::ResponseHistoryEntry;
use perfguard::thresholds::AdjustmentRecord;

fuzz_target!(|data: &[u8]| {
    // Persisted ledgers are read back at startup; malformed documents must
    // be rejected, never panic
    let _ = HistoryLedger::<AdjustmentRecord>::from_json(1000, data);
    let _ = HistoryLedger::<ResponseHistoryEntry>::from_json(500, data);

    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(config) = EngineConfig::from_toml_str(input) {
            // Anything that validates must also resolve its threshold map
            assert!(config.threshold_overrides().is_ok());
        }
    }
});
