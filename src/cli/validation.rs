use crate::cli::args::CliArgs;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(raw) = args.extensions.as_deref() {
        crate::utils::parse_extensions_csv(raw)
            .map_err(|e| format!("invalid --extensions '{raw}': {e}"))?;
    }
    if let Some(raw) = args.force_method.as_deref() {
        crate::utils::parse_method(raw).map_err(|e| format!("invalid --force-method: {e}"))?;
    }
    if let Some(raw) = args.output_format.as_deref() {
        crate::output::parse_format(raw)?;
    }
    if let Some(timeout) = args.timeout {
        if timeout == 0 {
            return Err("invalid timeout, expected positive integer".to_string());
        }
    }
    for raw in args.header.iter() {
        crate::route::parse_header(raw).map_err(|e| e.to_string())?;
    }
    if args.tls && args.probe.is_none() {
        return Err("--tls only applies to --probe".to_string());
    }
    if let Some(raw) = args.replay.as_deref() {
        crate::route::Target::parse(raw).map_err(|e| e.to_string())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_defaults() {
        assert!(validate(&CliArgs::default()).is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        let args = CliArgs {
            force_method: Some("FETCH".into()),
            ..CliArgs::default()
        };
        assert!(validate(&args).is_err());

        let args = CliArgs {
            header: vec!["NoSeparator".into()],
            ..CliArgs::default()
        };
        assert!(validate(&args).is_err());

        let args = CliArgs {
            tls: true,
            ..CliArgs::default()
        };
        assert!(validate(&args).is_err());

        let args = CliArgs {
            replay: Some("ftp://example.com".into()),
            ..CliArgs::default()
        };
        assert_eq!(validate(&args).unwrap_err(), "invalid target URL: ftp://example.com");
    }
}
