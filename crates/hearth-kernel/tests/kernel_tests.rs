//! End-to-end tests against the real kernel binary.

use hearth_core::config::KernelSettings;
use hearth_core::{KernelError, RpcCaller, ShutdownHook, StartOutcome, Supervisor};
use std::net::SocketAddr;
use tempfile::TempDir;

fn free_endpoint() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn settings(dir: &TempDir) -> KernelSettings {
    KernelSettings::from_lookup(|_| None)
        .unwrap()
        .with_endpoint(free_endpoint())
        .with_state_dir(dir.path())
        .with_kernel_bin(env!("CARGO_BIN_EXE_hearth-kernel"))
}

#[tokio::test]
async fn test_state_persists_until_reset() {
    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(settings(&dir));
    // Stops the kernel even if an assertion fails.
    let _hook = ShutdownHook::new(supervisor.clone());
    let caller = RpcCaller::new(supervisor.clone());

    let result = caller.execute("x = 1\nprint(x)").await.unwrap();
    assert!(result.success);
    assert_eq!(result.stdout, "1\n");
    assert!(supervisor.pid().is_some());

    let result = caller.execute("print(x+1)").await.unwrap();
    assert_eq!(result.stdout, "2\n");

    let inspect = caller.inspect("x").await.unwrap();
    assert_eq!(inspect.count, 1);
    assert_eq!(inspect.variables[0].type_name, "int");

    let reset = caller.reset().await.unwrap();
    assert!(reset.success);

    let result = caller.execute("print(x)").await.unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("NameError"));

    let status = caller.status().await.unwrap();
    assert_eq!(status.variable_count, 0);

    assert!(supervisor.stop().await.unwrap());
    assert!(!supervisor.is_running().await);
}

#[tokio::test]
async fn test_fault_keeps_kernel_alive() {
    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(settings(&dir));
    let _hook = ShutdownHook::new(supervisor.clone());
    let caller = RpcCaller::new(supervisor.clone());

    let result = caller
        .execute("y = 'kept'\nprint('before')\n1/0")
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.stdout, "before\n");
    assert!(result.error.unwrap().contains("ZeroDivisionError"));

    let result = caller.execute("print(y)").await.unwrap();
    assert!(result.success);
    assert_eq!(result.stdout, "kept\n");
}

#[tokio::test]
async fn test_second_supervisor_adopts_running_kernel() {
    let dir = TempDir::new().unwrap();
    let settings = settings(&dir);
    let owner = Supervisor::new(settings.clone());
    let _hook = ShutdownHook::new(owner.clone());

    assert!(matches!(owner.start().await.unwrap(), StartOutcome::Spawned { .. }));
    RpcCaller::new(owner.clone())
        .execute("shared = 42")
        .await
        .unwrap();

    let other = Supervisor::new(settings);
    assert_eq!(other.start().await.unwrap(), StartOutcome::Adopted);
    assert!(other.pid().is_none());

    let result = RpcCaller::new(other).execute("print(shared)").await.unwrap();
    assert_eq!(result.stdout, "42\n");
}

#[tokio::test]
async fn test_restart_discards_namespace() {
    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(settings(&dir));
    let _hook = ShutdownHook::new(supervisor.clone());
    let caller = RpcCaller::new(supervisor.clone());

    caller.execute("z = 1").await.unwrap();
    supervisor.restart().await.unwrap();

    let result = caller.execute("print(z)").await.unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("'z' is not defined"));
}

#[tokio::test]
async fn test_commands_report_not_running_without_starting() {
    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(settings(&dir));
    let caller = RpcCaller::new(supervisor.clone()).with_auto_start(false);

    assert!(matches!(
        caller.status().await,
        Err(KernelError::Unreachable { .. })
    ));
    assert!(matches!(
        caller.inspect("").await,
        Err(KernelError::Unreachable { .. })
    ));
    assert!(supervisor.pid().is_none());
}

#[tokio::test]
async fn test_kernel_output_goes_to_log_file() {
    let dir = TempDir::new().unwrap();
    let settings = settings(&dir);
    let log_file = settings.log_file();
    let supervisor = Supervisor::new(settings);
    let _hook = ShutdownHook::new(supervisor.clone());

    supervisor.start().await.unwrap();
    assert!(log_file.exists());
    assert!(dir.path().join("workspace").is_dir());
}
