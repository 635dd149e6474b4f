//! External configuration surface: the bind-info struct a transport binds
//! from and the flow-control YAML schema `FlowControllerRegistry` is
//! populated from. Parsing only; watching a path on disk for changes is
//! out of scope here.

use serde::Deserialize;

fn default_max_packet_size() -> u32 {
    10_000_000
}

fn default_recv_buffer_size() -> u32 {
    8_192
}

fn default_send_queue_timeout_ms() -> u64 {
    3_000
}

fn default_max_conn_num() -> usize {
    10_000
}

fn default_accept_thread_num() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SocketType {
    Net,
    Unix,
    Local,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Tcp,
    Udp,
    #[serde(rename = "tcp,udp")]
    TcpAndUdp,
}

/// The configuration a transport binds a listening adapter from. Every
/// field and default mirrors the external contract; the hook fields are
/// named here for schema completeness but are wired up in code, not YAML
/// (a YAML document can't carry a function pointer).
#[derive(Debug, Clone, Deserialize)]
pub struct BindInfo {
    pub socket_type: SocketType,
    pub ip: Option<String>,
    pub port: Option<u16>,
    #[serde(default)]
    pub is_ipv6: bool,
    pub network: NetworkKind,
    pub unix_path: Option<String>,
    pub protocol: String,

    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: u32,
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: u32,
    /// 0 means unbounded.
    #[serde(default)]
    pub send_queue_capacity: usize,
    #[serde(default = "default_send_queue_timeout_ms")]
    pub send_queue_timeout: u64,
    #[serde(default = "default_max_conn_num")]
    pub max_conn_num: usize,
    /// Milliseconds; 0 disables idle eviction.
    #[serde(default)]
    pub idle_time: u64,
    #[serde(default = "default_accept_thread_num")]
    pub accept_thread_num: u32,
    #[serde(default)]
    pub has_stream_rpc: bool,
}

/// One `func_limiter` entry: a method-level override of the service's
/// default limiter.
#[derive(Debug, Clone, Deserialize)]
pub struct FuncLimiterConfig {
    pub name: String,
    pub limiter: String,
    #[serde(default)]
    pub window_size: i32,
}

/// One `plugins.overload_control.flow_control` list entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceFlowControlConfig {
    pub service_name: String,
    pub service_limiter: String,
    #[serde(default)]
    pub window_size: i32,
    #[serde(default)]
    pub is_report: bool,
    #[serde(default)]
    pub func_limiter: Vec<FuncLimiterConfig>,
}

/// Top-level `plugins.overload_control.flow_control` document.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowControlConfig {
    pub flow_control: Vec<ServiceFlowControlConfig>,
}

/// Registers every service/method limiter named in `config` into
/// `registry`, matching the registration order the config lists them in.
#[cfg(feature = "overload-control")]
pub fn apply_flow_control_config(registry: &crate::overload::registry::FlowControllerRegistry, config: &FlowControlConfig) {
    for service in &config.flow_control {
        registry.register(&service.service_name, &service.service_limiter, service.window_size, service.is_report);

        for func in &service.func_limiter {
            let key = format!("{}/{}", service.service_name, func.name);
            registry.register(&key, &func.limiter, func.window_size, service.is_report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_bind_info_document() {
        let yaml = r#"
socket_type: net
ip: "0.0.0.0"
port: 8080
network: tcp
unix_path: null
protocol: http
max_conn_num: 5000
idle_time: 60000
has_stream_rpc: false
"#;
        let bind_info: BindInfo = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(bind_info.port, Some(8080));
        assert_eq!(bind_info.max_conn_num, 5000);
        assert_eq!(bind_info.max_packet_size, 10_000_000, "unset field must fall back to its documented default");
    }

    #[test]
    fn parses_flow_control_config_with_nested_func_limiter() {
        let yaml = r#"
flow_control:
  - service_name: trpc.test.helloworld.Greeter
    service_limiter: "seconds(1000)"
    window_size: 1
    is_report: true
    func_limiter:
      - name: SayHello
        limiter: "smooth(200)"
        window_size: 10
"#;
        let config: FlowControlConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.flow_control.len(), 1);
        assert_eq!(config.flow_control[0].func_limiter[0].name, "SayHello");
    }

    #[test]
    #[cfg(feature = "overload-control")]
    fn apply_flow_control_config_registers_service_and_method_limiters() {
        let registry = crate::overload::registry::FlowControllerRegistry::new();
        let yaml = r#"
flow_control:
  - service_name: svc
    service_limiter: "default(10)"
    func_limiter:
      - name: Method
        limiter: "default(5)"
"#;
        let config: FlowControlConfig = serde_yaml::from_str(yaml).unwrap();
        apply_flow_control_config(&registry, &config);

        assert!(registry.get("svc").is_some());
        assert!(registry.get("svc/Method").is_some());
    }
}
