// `config_digest` is written into session metadata (spec §6) so two hosts
// can detect topology drift after the fact; it is not used for anything at
// runtime. `rapidhash` is already a teacher-workspace dependency.

use crate::config::HermesConfig;
use hermes_base::Error;

pub fn config_digest(config: &HermesConfig) -> Result<String, Error> {
    let bytes = rmp_serde::to_vec(config).map_err(Error::from)?;
    let hash = rapidhash::rapidhash(&bytes);
    Ok(format!("{hash:016x}"))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{ExperimentConfig, StorageConfig, SyncConfig};

    fn minimal_config() -> HermesConfig {
        HermesConfig {
            broker_id: "a".into(),
            peers: vec![],
            clock_eligible: true,
            nodes: vec![],
            storage: StorageConfig {
                root_dir: "/tmp".into(),
                flush_hz: 10.0,
                high_water: 1000,
                drain_deadline_ms: 500,
                video_codec: None,
            },
            sync: SyncConfig {
                discover_timeout_ms: 1000,
                sync_timeout_ms: 1000,
            },
            experiment: ExperimentConfig::default(),
        }
    }

    #[test]
    fn digest_is_stable_for_equal_configs() {
        let a = config_digest(&minimal_config()).unwrap();
        let b = config_digest(&minimal_config()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn digest_changes_with_config() {
        let mut other = minimal_config();
        other.broker_id = "b".into();
        assert_ne!(
            config_digest(&minimal_config()).unwrap(),
            config_digest(&other).unwrap()
        );
    }
}
