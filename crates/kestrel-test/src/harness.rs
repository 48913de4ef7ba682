//! A kernel wired to an [`ArtifactFixture`].

use std::io;
use std::ops::Deref;
use std::sync::Arc;

use kestrel_artifact::{Repository, RepositorySource};
use kestrel_core::Coordinate;
use kestrel_kernel::{Kernel, KernelBuilder, KernelResult};

use tracing_subscriber::EnvFilter;

use crate::fixtures::ArtifactFixture;
use crate::mocks::RecordingSubscriber;

/// Route `tracing` output through the test writer.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn setup_test_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
    tracing::trace!(filter, "test logging ready");
}

/// Own coordinate of every test kernel.
pub const TEST_KERNEL_ARTIFACT: &str = "io.kestrel:kernel:0.0.0-test";

/// A kernel over a fixture repository, with every event recorded.
///
/// Derefs to [`Kernel`].
#[derive(Debug)]
pub struct TestKernel {
    kernel: Arc<Kernel>,
    events: Arc<RecordingSubscriber>,
}

impl TestKernel {
    /// Builder preconfigured with the fixture's repository and cache.
    ///
    /// # Errors
    ///
    /// Never fails for the built-in coordinate; kept fallible so callers
    /// can use `?`.
    pub fn builder(fixture: &ArtifactFixture) -> io::Result<KernelBuilder> {
        let artifact = Coordinate::parse(TEST_KERNEL_ARTIFACT)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let source = RepositorySource::new(fixture.cache())
            .with_repository(Repository::new("fixture", fixture.repository()));
        Ok(Kernel::builder(artifact)
            .source(Arc::new(source))
            .cache_dir(fixture.cache()))
    }

    /// Build from `builder`, recording events from the start.
    #[must_use]
    pub fn from_builder(builder: KernelBuilder) -> Self {
        let kernel = Arc::new(builder.build());
        let events = RecordingSubscriber::attach(kernel.bus());
        Self { kernel, events }
    }

    /// A kernel over `fixture`, not yet started.
    ///
    /// # Errors
    ///
    /// See [`TestKernel::builder`].
    pub fn new(fixture: &ArtifactFixture) -> io::Result<Self> {
        Ok(Self::from_builder(Self::builder(fixture)?))
    }

    /// A started kernel over `fixture`.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel fails to start.
    pub fn started(fixture: &ArtifactFixture) -> KernelResult<Self> {
        let kernel = Self::new(fixture)?;
        kernel.start()?;
        Ok(kernel)
    }

    /// Shared handle to the kernel.
    #[must_use]
    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// Every event published since construction.
    #[must_use]
    pub fn events(&self) -> &Arc<RecordingSubscriber> {
        &self.events
    }
}

impl Deref for TestKernel {
    type Target = Kernel;

    fn deref(&self) -> &Kernel {
        &self.kernel
    }
}
