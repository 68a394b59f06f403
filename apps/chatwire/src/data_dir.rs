pub(crate) fn resolve_data_dir(cli_value: Option<&str>) -> String {
    if let Some(value) = cli_value
        && !value.trim().is_empty()
    {
        return value.to_string();
    }
    if let Ok(value) = std::env::var("CHATWIRE_DATA_DIR")
        && !value.trim().is_empty()
    {
        return value;
    }
    "./data".to_string()
}
