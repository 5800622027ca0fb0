use conductor_domain::config::{Config, McpServerConfig, McpTransportKind};

#[test]
fn minimal_toml_config_parses_and_validates() {
    let raw = r#"
        [server]
        port = 9000

        [sessions]
        max_iterations = 8

        [[mcp.servers]]
        id = "salesforce"
        command = "crm-mcp-server"

        [[mcp.servers]]
        id = "brevo"
        command = "brevo-mcp-server"

        [[mcp.servers]]
        id = "linkly"
        command = "linkly-mcp-server"

        [llm.roles.planner]
        model = "anthropic/claude-sonnet"
        require_tools = true
        require_json = true
    "#;

    let cfg: Config = toml::from_str(raw).unwrap();
    assert!(cfg.is_valid());
    assert_eq!(cfg.mcp.service_names(), vec!["salesforce", "brevo", "linkly"]);
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.sessions.max_iterations, 8);
}

#[test]
fn sse_server_without_command_is_valid() {
    let mut cfg = Config::default();
    cfg.mcp.servers.push(McpServerConfig {
        id: "remote".into(),
        command: String::new(),
        args: vec![],
        transport: McpTransportKind::Sse,
        url: Some("https://example.invalid/mcp".into()),
        env: Default::default(),
        call_timeout_ms: None,
    });
    assert!(cfg.is_valid());
}
