use ort::execution_providers::ExecutionProviderDispatch;

/// Execution providers to try before ONNX Runtime's CPU default.
///
/// An empty list means CPU only. Registration failures of a listed provider
/// fall back to CPU inside `ort`.
pub fn preferred_execution_providers() -> Vec<ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Vec::new()
    }
}
