//! Launcher and supervisor working together through the handoff file.

use std::io;
use std::sync::{Arc, Mutex};

use kestrel_artifact::IsolationPolicy;
use kestrel_core::ServerState;
use kestrel_kernel::{
    ARTIFACT_LOCATION_ARG, ChildSpawner, ExitDisposition, Flow, Handoff, Launcher, Supervisor,
    Termination,
};
use kestrel_test::{ArtifactFixture, TestKernel};

/// Runs each "child" as an in-process launcher on a fresh runtime.
struct InProcess<'a> {
    fixture: &'a ArtifactFixture,
    generation: Mutex<u32>,
    seen_args: Mutex<Vec<Vec<String>>>,
}

impl ChildSpawner for InProcess<'_> {
    fn run(&self, args: &[String]) -> io::Result<i32> {
        self.seen_args.lock().unwrap().push(args.to_vec());
        let generation = {
            let mut g = self.generation.lock().unwrap();
            *g = g.saturating_add(1);
            *g
        };

        let kernel = TestKernel::new(self.fixture)?;
        let launcher = Launcher::new(Arc::clone(kernel.kernel()), self.fixture.handoff());
        let handle = kernel.termination_handle();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let disposition = runtime.block_on(launcher.run(
            async move {
                match generation {
                    1 => Flow::Terminate(Termination::Restart {
                        location: Some("/opt/kestrel/v2".into()),
                    }),
                    2 => {
                        handle.clean();
                        Flow::Continue(())
                    },
                    _ => Flow::Continue(()),
                }
            },
            async move {
                if generation >= 3 {
                    return;
                }
                std::future::pending::<()>().await;
            },
        ));
        Ok(disposition.code())
    }
}

#[test]
fn test_restart_then_clean_then_exit() {
    let fixture = ArtifactFixture::new().unwrap();
    std::fs::create_dir_all(fixture.cache().join("stale")).unwrap();
    let child = InProcess {
        fixture: &fixture,
        generation: Mutex::new(0),
        seen_args: Mutex::new(Vec::new()),
    };

    let disposition =
        Supervisor::new(&child, vec!["run".into()], fixture.handoff(), fixture.cache()).run();
    assert_eq!(disposition, ExitDisposition::Terminate);

    let args = child.seen_args.lock().unwrap();
    assert_eq!(args.len(), 3);
    assert_eq!(args[0], vec!["run".to_string()]);
    assert_eq!(args[1], vec![
        "run".to_string(),
        ARTIFACT_LOCATION_ARG.to_string(),
        "/opt/kestrel/v2".to_string(),
    ]);
    assert_eq!(args[2], args[1]);
    assert!(!fixture.handoff().exists());
}

#[tokio::test]
async fn test_workload_can_use_kernel_before_restart() {
    let fixture = ArtifactFixture::new().unwrap();
    let widgets = fixture
        .directory("org.example:widgets:1.0", &[("Widget", b"w")])
        .unwrap();
    let kernel = TestKernel::new(&fixture).unwrap();
    let launcher = Launcher::new(Arc::clone(kernel.kernel()), fixture.handoff());
    let inner = Arc::clone(kernel.kernel());

    let disposition = launcher
        .run(
            async move {
                inner.load(&widgets, IsolationPolicy::None).unwrap();
                Flow::Terminate(Termination::Restart { location: None })
            },
            std::future::pending(),
        )
        .await;

    assert_eq!(disposition, ExitDisposition::Restart);
    assert_eq!(kernel.status(), ServerState::Stopped);
    assert!(kernel.artifacts().is_empty());
    let handoff = Handoff::read(&fixture.handoff()).unwrap().unwrap();
    assert_eq!(handoff.termination(), Termination::Restart { location: None });
    assert!(kernel.events().event_types().contains(&"artifact_unloaded"));
}

#[tokio::test]
async fn test_latest_request_wins() {
    let fixture = ArtifactFixture::new().unwrap();
    let kernel = TestKernel::new(&fixture).unwrap();
    let launcher = Launcher::new(Arc::clone(kernel.kernel()), fixture.handoff());
    let handle = kernel.termination_handle();

    let disposition = launcher
        .run(
            async move {
                handle.restart(Some("/first".into()));
                handle.clean();
                Flow::Continue(())
            },
            std::future::pending(),
        )
        .await;

    assert_eq!(disposition, ExitDisposition::Clean);
}
