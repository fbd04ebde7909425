/// This macro is a wrapper around `tracing::trace!` and should not be confused with snapshot
/// testing. It tags logging statements so external tools can follow how delegation plans evolve
/// while merged types are resolved.
///
/// Pass an identifier to serialize the value with serde_json and tag the snapshot with its type
/// name:
/// ```ignore
/// snapshot!(plan, "built delegation plan");
/// // Generates:
/// // trace!(snapshot = "DelegationPlan", data = "{ .. }", "built delegation plan");
/// ```
/// Or pass the tag and a value implementing tracing's `Value` trait directly:
/// ```ignore
/// snapshot!("DelegationPlan", plan.to_string(), "built delegation plan");
/// ```
macro_rules! snapshot {
    ($value:expr, $msg:literal) => {
        #[cfg(feature = "snapshot_tracing")]
        tracing::trace!(
            snapshot = std::any::type_name_of_val(&$value),
            data = serde_json::to_string(&$value).unwrap_or_default(),
            $msg
        );
    };
    ($name:literal, $value:expr, $msg:literal) => {
        #[cfg(feature = "snapshot_tracing")]
        tracing::trace!(snapshot = $name, data = $value, $msg);
    };
}

pub(crate) use snapshot;
