#![cfg(unix)]

use icalc_bridge::supervisor::{
    PortPlan, StopReason, Supervisor, SupervisorPhase, SupervisorSettings, WorkerSpec, allocate,
};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};

fn quick_settings() -> SupervisorSettings {
    SupervisorSettings {
        stagger: Duration::from_millis(10),
        poll_interval: Duration::from_millis(20),
        drain_timeout: Some(Duration::from_secs(5)),
    }
}

fn specs(workers: u16) -> Vec<WorkerSpec> {
    allocate(workers, PortPlan::default(), 60.0, true, false).unwrap()
}

fn sleeper(seconds: &str) -> io::Result<Child> {
    Command::new("sleep").arg(seconds).kill_on_drop(true).spawn()
}

fn is_running(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[tokio::test]
async fn stops_when_every_worker_has_exited() {
    let launcher = |spec: &WorkerSpec| sleeper(if spec.index == 0 { "0.1" } else { "0.4" });

    let started = Instant::now();
    let report = Supervisor::new(launcher, quick_settings())
        .run(&specs(2), std::future::pending())
        .await;

    assert!(started.elapsed() >= Duration::from_millis(400));
    assert_eq!(report.reason, StopReason::AllExited);
    assert_eq!(report.launched, 2);
    assert_eq!(
        report.phases,
        vec![
            SupervisorPhase::Starting,
            SupervisorPhase::Running,
            SupervisorPhase::Stopped
        ]
    );
}

#[tokio::test]
async fn a_crashed_worker_leaves_siblings_running() {
    let pids = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&pids);
    let launcher = move |_: &WorkerSpec| -> io::Result<Child> {
        let child = sleeper("30")?;
        recorded.lock().unwrap().extend(child.id());
        Ok(child)
    };

    let supervisor = Supervisor::new(launcher, quick_settings());
    let workers = specs(2);
    let run = tokio::spawn(async move { supervisor.run(&workers, std::future::pending()).await });

    while pids.lock().unwrap().len() < 2 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let (first, second) = {
        let pids = pids.lock().unwrap();
        (pids[0], pids[1])
    };

    kill(Pid::from_raw(first as i32), Signal::SIGKILL).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!run.is_finished(), "supervisor must outlive a single crash");
    assert!(is_running(second));

    kill(Pid::from_raw(second as i32), Signal::SIGKILL).unwrap();
    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.reason, StopReason::AllExited);
    assert_eq!(report.launched, 2);
}

#[tokio::test]
async fn interrupt_drains_all_workers() {
    let pids = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&pids);
    let launcher = move |_: &WorkerSpec| -> io::Result<Child> {
        let child = sleeper("30")?;
        recorded.lock().unwrap().extend(child.id());
        Ok(child)
    };

    let started = Instant::now();
    let report = Supervisor::new(launcher, quick_settings())
        .run(&specs(3), tokio::time::sleep(Duration::from_millis(300)))
        .await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.reason, StopReason::Interrupted);
    assert_eq!(report.launched, 3);
    assert_eq!(
        report.phases,
        vec![
            SupervisorPhase::Starting,
            SupervisorPhase::Running,
            SupervisorPhase::Draining,
            SupervisorPhase::Stopped
        ]
    );
    for pid in pids.lock().unwrap().iter() {
        assert!(!is_running(*pid), "worker {pid} survived draining");
    }
}

#[tokio::test]
async fn stubborn_worker_is_killed_after_drain_timeout() {
    let launcher = |_: &WorkerSpec| {
        Command::new("sh")
            .args(["-c", "trap '' TERM; exec sleep 30"])
            .kill_on_drop(true)
            .spawn()
    };
    let settings = SupervisorSettings {
        drain_timeout: Some(Duration::from_millis(200)),
        ..quick_settings()
    };

    let started = Instant::now();
    let report = Supervisor::new(launcher, settings)
        .run(&specs(1), tokio::time::sleep(Duration::from_millis(200)))
        .await;

    assert_eq!(report.reason, StopReason::Interrupted);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn stubborn_workers_share_one_drain_window() {
    let launcher = |_: &WorkerSpec| {
        Command::new("sh")
            .args(["-c", "trap '' TERM; exec sleep 30"])
            .kill_on_drop(true)
            .spawn()
    };
    let settings = SupervisorSettings {
        drain_timeout: Some(Duration::from_millis(500)),
        ..quick_settings()
    };

    let started = Instant::now();
    let report = Supervisor::new(launcher, settings)
        .run(&specs(3), tokio::time::sleep(Duration::from_millis(200)))
        .await;

    assert_eq!(report.reason, StopReason::Interrupted);
    assert_eq!(report.launched, 3);
    // One window for all three, not one after another (which would be 1.5s).
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(700), "drained after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1400), "drained after {elapsed:?}");
}

#[tokio::test]
async fn failed_launch_does_not_abort_the_rest() {
    let launcher = |spec: &WorkerSpec| {
        if spec.index == 0 {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such binary"))
        } else {
            sleeper("0.1")
        }
    };

    let report = Supervisor::new(launcher, quick_settings())
        .run(&specs(2), std::future::pending())
        .await;

    assert_eq!(report.launched, 1);
    assert_eq!(report.failed_launches, 1);
    assert_eq!(report.reason, StopReason::AllExited);
}

#[tokio::test]
async fn nothing_launched_stops_immediately() {
    let launcher =
        |_: &WorkerSpec| -> io::Result<Child> { Err(io::Error::other("driver unavailable")) };

    let report = Supervisor::new(launcher, quick_settings())
        .run(&specs(2), std::future::pending())
        .await;

    assert_eq!(report.launched, 0);
    assert_eq!(report.failed_launches, 2);
    assert_eq!(report.reason, StopReason::AllExited);
}
