//! Sources the model asset is loaded from.
#![allow(async_fn_in_trait)]

use crate::error::ModelError;
use crate::model::{load_glb_from_slice, ModelMesh};

/// Loads a model by name, asynchronously.
pub trait ModelLoader {
    async fn load(&self, name: &str) -> Result<ModelMesh, ModelError>;
}

/// Serves an already decoded mesh regardless of the requested name.
#[derive(Debug, Clone)]
pub struct StaticModelLoader {
    mesh: Option<ModelMesh>,
}

impl StaticModelLoader {
    pub fn new(mesh: ModelMesh) -> Self {
        Self { mesh: Some(mesh) }
    }

    /// Loader whose every request fails, as when the asset is missing.
    pub fn missing() -> Self {
        Self { mesh: None }
    }
}

impl ModelLoader for StaticModelLoader {
    async fn load(&self, name: &str) -> Result<ModelMesh, ModelError> {
        self.mesh.clone().ok_or_else(|| ModelError::Fetch {
            name: name.to_string(),
            message: "no such asset".to_string(),
        })
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native::FsModelLoader;
#[cfg(target_arch = "wasm32")]
pub use web::FetchModelLoader;

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::path::PathBuf;

    use log::info;

    use super::*;

    /// Reads `.glb` files relative to a base directory.
    #[derive(Debug, Clone)]
    pub struct FsModelLoader {
        base: PathBuf,
    }

    impl FsModelLoader {
        pub fn new(base: impl Into<PathBuf>) -> Self {
            Self { base: base.into() }
        }
    }

    impl ModelLoader for FsModelLoader {
        async fn load(&self, name: &str) -> Result<ModelMesh, ModelError> {
            let path = self.base.join(name);
            let bytes = std::fs::read(&path).map_err(|err| ModelError::Fetch {
                name: name.to_string(),
                message: format!("{}: {err}", path.display()),
            })?;
            info!("read {} ({} bytes)", path.display(), bytes.len());
            load_glb_from_slice(name, &bytes)
        }
    }
}

#[cfg(target_arch = "wasm32")]
mod web {
    use js_sys::Uint8Array;
    use log::info;
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;
    use web_sys::{window, Response};

    use super::*;

    /// Fetches `.glb` files relative to a base URL (the page by default).
    #[derive(Debug, Clone, Default)]
    pub struct FetchModelLoader {
        base_url: String,
    }

    impl FetchModelLoader {
        pub fn new(base_url: impl Into<String>) -> Self {
            Self {
                base_url: base_url.into(),
            }
        }

        async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, String> {
            let window = window().ok_or_else(|| "window not available".to_string())?;
            let response = JsFuture::from(window.fetch_with_str(url))
                .await
                .map_err(|err| format!("{err:?}"))?
                .dyn_into::<Response>()
                .map_err(|_| "fetch did not return a Response".to_string())?;
            if !response.ok() {
                return Err(format!("HTTP {}", response.status()));
            }
            let buffer = JsFuture::from(response.array_buffer().map_err(|err| format!("{err:?}"))?)
                .await
                .map_err(|err| format!("{err:?}"))?;
            Ok(Uint8Array::new(&buffer).to_vec())
        }
    }

    impl ModelLoader for FetchModelLoader {
        async fn load(&self, name: &str) -> Result<ModelMesh, ModelError> {
            let url = format!("{}{name}", self.base_url);
            let bytes = self
                .fetch_bytes(&url)
                .await
                .map_err(|message| ModelError::Fetch {
                    name: name.to_string(),
                    message,
                })?;
            info!("fetched {url} ({} bytes)", bytes.len());
            load_glb_from_slice(name, &bytes)
        }
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use futures::executor::block_on;

    use super::*;

    #[test]
    fn missing_file_reports_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FsModelLoader::new(dir.path());
        let err = block_on(loader.load("product1.glb")).unwrap_err();
        assert!(matches!(err, ModelError::Fetch { ref name, .. } if name == "product1.glb"));
    }

    #[test]
    fn static_loader_ignores_the_name() {
        let loader = StaticModelLoader::new(ModelMesh::unit_cube());
        let mesh = block_on(loader.load("anything.glb")).unwrap();
        assert_eq!(mesh.triangle_count(), 12);
        assert!(block_on(StaticModelLoader::missing().load("x.glb")).is_err());
    }
}
