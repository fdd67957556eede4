use common::{Environment, Lookup};
use controller::BarrierConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub device_id: String,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub environment: Environment,
    pub addr: String,
    pub otel_endpoint: Option<String>,
    pub settings_path: PathBuf,
    pub demo_dir: PathBuf,
    pub models_dir: PathBuf,
    pub snapshot_dir: PathBuf,
    pub font_path: Option<PathBuf>,
    pub execution_provider: String,
    pub confidence_threshold: f32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub plate_service_url: String,
    pub plate_service_timeout: Duration,
    pub allow_list_path: Option<PathBuf>,
    pub allow_list_url: Option<String>,
    pub auth_tokens: Vec<String>,
    pub auth_verify_url: Option<String>,
    pub mqtt: Option<MqttConfig>,
    pub cors_origins: Vec<String>,
    pub barrier: BarrierConfig,
}

impl GatewayConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Self {
        Self::from_lookup(&Lookup::process())
    }

    pub fn from_lookup(lookup: &Lookup) -> Self {
        let mqtt = lookup.get("MQTT_BROKER_HOST").map(|host| MqttConfig {
            host,
            port: lookup.parsed("MQTT_BROKER_PORT", 1883),
            topic: lookup.string("MQTT_TOPIC", "gatekeeper/barrier/state"),
            device_id: lookup.string("MQTT_DEVICE_ID", "gateway"),
        });

        let defaults = BarrierConfig::default();
        let barrier = BarrierConfig {
            presence_timeout: Duration::from_secs(
                lookup.parsed("PRESENCE_TIMEOUT_SECS", defaults.presence_timeout.as_secs()),
            ),
            presence_poll: Duration::from_millis(
                lookup.parsed("PRESENCE_POLL_MS", defaults.presence_poll.as_millis() as u64),
            ),
            auto_lower: Duration::from_secs(
                lookup.parsed("BARRIER_AUTO_LOWER_SECS", defaults.auto_lower.as_secs()),
            ),
        };

        Self {
            environment: Environment::from_lookup(lookup),
            addr: lookup.string("GATEWAY_ADDR", "0.0.0.0:8000"),
            otel_endpoint: lookup.get("OTEL_ENDPOINT"),
            settings_path: lookup
                .string("SETTINGS_PATH", "config/detection_settings.json")
                .into(),
            demo_dir: lookup.string("DEMO_DIR", "demo").into(),
            models_dir: lookup.string("MODELS_DIR", "models").into(),
            snapshot_dir: lookup.string("SNAPSHOT_DIR", "detect_image").into(),
            font_path: lookup.get("FONT_PATH").map(PathBuf::from),
            execution_provider: lookup.string("EXECUTION_PROVIDER", "cpu"),
            confidence_threshold: lookup.parsed("CONFIDENCE_THRESHOLD", 0.25),
            frame_width: lookup.parsed("FRAME_WIDTH", 1280),
            frame_height: lookup.parsed("FRAME_HEIGHT", 720),
            plate_service_url: lookup.string("PLATE_SERVICE_URL", "http://localhost:8081/nomer"),
            plate_service_timeout: Duration::from_secs(lookup.parsed("PLATE_SERVICE_TIMEOUT_SECS", 30)),
            allow_list_path: lookup.get("ALLOW_LIST_PATH").map(PathBuf::from),
            allow_list_url: lookup.get("ALLOW_LIST_URL"),
            auth_tokens: lookup.list("AUTH_TOKENS"),
            auth_verify_url: lookup.get("AUTH_VERIFY_URL"),
            mqtt,
            cors_origins: lookup.list("CORS_ORIGINS"),
            barrier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> Lookup {
        Lookup::from_pairs(Vec::<(String, String)>::new())
    }

    #[test]
    fn defaults() {
        let config = GatewayConfig::from_lookup(&empty());

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.addr, "0.0.0.0:8000");
        assert_eq!(config.settings_path, PathBuf::from("config/detection_settings.json"));
        assert_eq!(config.snapshot_dir, PathBuf::from("detect_image"));
        assert_eq!(config.plate_service_url, "http://localhost:8081/nomer");
        assert_eq!(config.plate_service_timeout, Duration::from_secs(30));
        assert_eq!((config.frame_width, config.frame_height), (1280, 720));
        assert_eq!(config.barrier.auto_lower, Duration::from_secs(10));
        assert_eq!(config.barrier.presence_timeout, Duration::from_secs(30));
        assert_eq!(config.barrier.presence_poll, Duration::from_millis(500));
        assert!(config.mqtt.is_none(), "MQTT is opt-in");
        assert!(config.auth_tokens.is_empty());
        assert!(config.otel_endpoint.is_none());
    }

    #[test]
    fn overrides() {
        let lookup = Lookup::from_pairs([
            ("ENVIRONMENT", "production"),
            ("GATEWAY_ADDR", "127.0.0.1:9000"),
            ("AUTH_TOKENS", "alpha, beta,,"),
            ("MQTT_BROKER_HOST", "mosquitto"),
            ("MQTT_DEVICE_ID", "gate-7"),
            ("BARRIER_AUTO_LOWER_SECS", "15"),
            ("PRESENCE_POLL_MS", "250"),
            ("CORS_ORIGINS", "http://localhost:5173"),
        ]);
        let config = GatewayConfig::from_lookup(&lookup);

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.addr, "127.0.0.1:9000");
        assert_eq!(config.auth_tokens, vec!["alpha", "beta"]);
        assert_eq!(
            config.mqtt,
            Some(MqttConfig {
                host: "mosquitto".into(),
                port: 1883,
                topic: "gatekeeper/barrier/state".into(),
                device_id: "gate-7".into(),
            })
        );
        assert_eq!(config.barrier.auto_lower, Duration::from_secs(15));
        assert_eq!(config.barrier.presence_poll, Duration::from_millis(250));
        assert_eq!(config.cors_origins, vec!["http://localhost:5173"]);
    }

    #[test]
    fn garbage_numbers_fall_back() {
        let lookup = Lookup::from_pairs([("FRAME_WIDTH", "wide"), ("CONFIDENCE_THRESHOLD", "high")]);
        let config = GatewayConfig::from_lookup(&lookup);

        assert_eq!(config.frame_width, 1280);
        assert_eq!(config.confidence_threshold, 0.25);
    }
}
