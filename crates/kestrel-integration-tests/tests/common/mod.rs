//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use kestrel_artifact::{ArtifactContext, IsolationPolicy};
use kestrel_core::Coordinate;
use kestrel_test::{ArtifactFixture, TestKernel, setup_test_logging};

/// A started kernel over a fixture with `widgets` and `gadgets` artifacts.
pub struct World {
    pub fixture: ArtifactFixture,
    pub kernel: TestKernel,
    pub widgets: Coordinate,
    pub gadgets: Coordinate,
}

impl World {
    pub fn new() -> Self {
        setup_test_logging("warn");
        let fixture = ArtifactFixture::new().unwrap();
        let widgets = fixture
            .directory(
                "org.example:widgets:1.0",
                &[("org/example/Widget", b"widget"), ("shared/Common", b"from-widgets")],
            )
            .unwrap();
        let gadgets = fixture
            .archive(
                "org.example:gadgets:2.1",
                &[("org/example/Gadget", b"gadget"), ("shared/Common", b"from-gadgets")],
            )
            .unwrap();
        let kernel = TestKernel::started(&fixture).unwrap();
        Self {
            fixture,
            kernel,
            widgets,
            gadgets,
        }
    }

    pub fn load(
        &self,
        coordinate: &Coordinate,
        isolation: IsolationPolicy,
    ) -> Arc<ArtifactContext> {
        self.kernel.load(coordinate, isolation).unwrap()
    }
}
