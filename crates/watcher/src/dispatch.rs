//! Event dispatcher
//!
//! `Runtime` owns everything the watcher mutates: the watch tree, the
//! debouncer, the supervised command and the diff engine. It is driven by a
//! single blocking loop; a shutdown request is only ever acted on between
//! reads, never from signal context. With a `WakePipe` attached the loop
//! polls the notifier and the pipe together, so a request that lands just
//! before it blocks is not lost.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use sqwatch_core::{CacheStore, Console, EventMask, Tone, WatchConfig, WatchError, WatchResult};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use sqwatch_diff::{ChangeLog, DiffEngine, RetryPolicy};
use tracing::{debug, info, warn};

use crate::debounce::{Debouncer, Decision};
use crate::notifier::{Notifier, RawEvent};
use crate::supervisor::{signal_report, ChildExit, Supervisor};
use crate::tree::{RegisterStats, Reregistration, WatchTree, Watched};
use crate::wake::WakePipe;

pub struct Runtime<N: Notifier, C: Console> {
    config: WatchConfig,
    tree: WatchTree<N>,
    debouncer: Debouncer,
    supervisor: Supervisor,
    engine: Option<DiffEngine>,
    console: C,
    wake: Option<WakePipe>,
    closed: bool,
}

impl<N: Notifier, C: Console> Runtime<N, C> {
    pub fn new(config: WatchConfig, notifier: N, console: C) -> Self {
        let cache = config.caching().map(CacheStore::new);
        let engine = cache.clone().map(|cache| {
            let log = config.log_file.clone().map(ChangeLog::new);
            DiffEngine::new(cache, log, config.verbose)
        });
        let tree = WatchTree::new(notifier, config.mask, config.max_watches, cache);

        Self {
            debouncer: Debouncer::new(config.debounce),
            supervisor: Supervisor::new(config.grace_period),
            tree,
            engine,
            console,
            config,
            wake: None,
            closed: false,
        }
    }

    /// Override the diff engine's read retry budget
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.engine = self.engine.take().map(|engine| engine.with_retry(retry));
        self
    }

    /// Wake the loop whenever `wake` is written to
    pub fn with_wake(mut self, wake: WakePipe) -> Self {
        self.wake = Some(wake);
        self
    }

    /// Register every configured root
    pub fn populate(&mut self) -> RegisterStats {
        let mut stats = RegisterStats::default();
        for root in &self.config.paths {
            stats += self.tree.register(root);
        }
        info!(
            "Watching {} files in {} directories",
            self.tree.file_count(),
            self.tree.dir_count()
        );
        if stats.skipped > 0 {
            warn!("{} paths could not be watched", stats.skipped);
        }
        stats
    }

    /// Dispatch events until `shutdown` is raised or a fatal error occurs
    ///
    /// Teardown has always run by the time this returns.
    pub fn run(&mut self, shutdown: &AtomicBool) -> WatchResult<()> {
        loop {
            if shutdown.load(Ordering::SeqCst) {
                self.shutdown();
                return Ok(());
            }

            self.report_exit();

            match self.wait_for_events() {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    self.shutdown();
                    return Err(WatchError::Read(e));
                }
            }

            let batch = match self.tree.notifier_mut().read_events() {
                Ok(batch) => batch,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.shutdown();
                    return Err(WatchError::Read(e));
                }
            };

            if let Err(e) = self.handle_batch(batch, Instant::now()) {
                self.shutdown();
                return Err(e);
            }
        }
    }

    /// Block until the notifier has events (true) or the loop was woken
    /// (false)
    fn wait_for_events(&self) -> io::Result<bool> {
        let (Some(wake), Some(events)) = (&self.wake, self.tree.notifier().ready_fd()) else {
            return Ok(true);
        };

        let mut fds = [
            PollFd::new(&events, PollFlags::POLLIN),
            PollFd::new(wake, PollFlags::POLLIN),
        ];
        match poll(&mut fds, -1) {
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        let ready = fds[0].revents().map_or(false, |revents| !revents.is_empty());
        if fds[1].revents().map_or(false, |revents| !revents.is_empty()) {
            wake.drain();
        }
        Ok(ready)
    }

    /// Handle one batch of events, in order
    ///
    /// Only fatal errors are returned.
    pub fn handle_batch(
        &mut self,
        batch: Vec<RawEvent<N::Descriptor>>,
        now: Instant,
    ) -> WatchResult<()> {
        for event in batch {
            self.handle_event(event, now)?;
        }
        Ok(())
    }

    fn handle_event(
        &mut self,
        event: RawEvent<N::Descriptor>,
        now: Instant,
    ) -> WatchResult<()> {
        if event.mask.contains(EventMask::Q_OVERFLOW) {
            warn!("Event queue overflowed");
            self.console
                .say(Tone::Error, "+ Event queue overflow, some events were lost");
            return Ok(());
        }

        let path = match self.tree.lookup(event.wd) {
            Watched::Dir(dir) => {
                self.handle_dir_event(&dir, event);
                return Ok(());
            }
            Watched::File(path) => path,
            Watched::Unknown => {
                debug!("Event {:?} on unknown watch {:?}", event.mask, event.wd);
                return Ok(());
            }
        };

        if let Err(e) = fs::metadata(&path) {
            debug!("{} is gone: {}", path.display(), e);
            self.tree.teardown_file(event.wd);
            self.console
                .say(Tone::Muted, format!("+ Stopped watching {}", path.display()));
            return Ok(());
        }

        let label = event.mask.label();
        let mut wd = event.wd;
        let mut rewatched = false;
        if event.mask.contains(EventMask::IGNORED) {
            match self.tree.reregister(wd) {
                Reregistration::Rewatched(new) => {
                    wd = new;
                    rewatched = true;
                }
                Reregistration::Removed | Reregistration::Unknown => return Ok(()),
            }
        }

        if let Decision::Trigger { debounced } = self.debouncer.observe(now, label, rewatched) {
            if !debounced.is_empty() {
                self.console.say(
                    Tone::Muted,
                    format!("+ Debounced: [ {} ]", debounced.join(", ")),
                );
            }
            if !rewatched {
                self.console
                    .say(Tone::Trigger, format!("+ Trigger: [ {} ]", label));
            }
            self.supervisor.supervise(self.config.command.as_deref())?;

            if rewatched || event.mask.is_content_change() {
                self.diff(wd, &path, label);
            }
        }
        Ok(())
    }

    fn handle_dir_event(&mut self, dir: &Path, event: RawEvent<N::Descriptor>) {
        if event.mask.contains(EventMask::IGNORED) {
            debug!("Directory watch on {} was dropped", dir.display());
            self.tree.forget_dir(event.wd);
        } else if event.mask.contains(EventMask::CREATE) {
            if let Some(name) = &event.name {
                let stats = self.tree.handle_create(dir, name);
                debug!(
                    "New entry {:?} in {}: {} dirs, {} files",
                    name,
                    dir.display(),
                    stats.dirs,
                    stats.files
                );
            }
        }
    }

    /// Diff a changed file against its snapshot, creating the snapshot first
    /// if it does not exist yet
    fn diff(&mut self, wd: N::Descriptor, path: &Path, label: &str) {
        let Some(engine) = &self.engine else {
            return;
        };

        match self.tree.entry(wd).and_then(|entry| entry.cached.clone()) {
            Some(cached) => {
                engine.diff(path, &cached, label, &mut self.console);
            }
            None => match engine.cache().ensure(path) {
                Ok(cached) => self.tree.set_cached(wd, cached),
                Err(e) => {
                    warn!("{:#}", e);
                    self.console.say(Tone::Error, e.to_string());
                }
            },
        }
    }

    fn report_exit(&mut self) {
        match self.supervisor.poll() {
            Some(ChildExit::Signaled(signal)) => {
                self.console
                    .say(Tone::Error, format!("+ {}", signal_report(signal)));
            }
            Some(ChildExit::Exited(0)) => debug!("Command finished"),
            Some(ChildExit::Exited(code)) => debug!("Command exited with status {}", code),
            None => {}
        }
    }

    /// Tear everything down; later calls do nothing
    ///
    /// Kills the live command, purges the cache directory and removes every
    /// watch, in that order.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(debounced) = self.debouncer.flush() {
            self.console.say(
                Tone::Muted,
                format!("+ Debounced: [ {} ]", debounced.join(", ")),
            );
        }

        self.console.say(Tone::Removed, "+ Exiting sqwatch...");
        self.supervisor.retire();

        if let Some(cache) = self.tree.cache() {
            self.console.say(
                Tone::Removed,
                format!("+ Wiping cache directory: {}", cache.dir().display()),
            );
            if let Err(e) = cache.purge() {
                warn!("{:#}", e);
                self.console.say(Tone::Error, e.to_string());
            }
        }

        self.console.say(Tone::Removed, "+ Removing watches");
        self.tree.remove_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn tree(&self) -> &WatchTree<N> {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut WatchTree<N> {
        &mut self.tree
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }
}

impl<N: Notifier, C: Console> Drop for Runtime<N, C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::InotifyNotifier;
    use crate::testing::{child_event, event, ScriptedNotifier};
    use sqwatch_core::MemoryConsole;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::thread::sleep;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        temp_dir: TempDir,
        watched: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let watched = temp_dir.path().join("watched");
            fs::create_dir(&watched).unwrap();
            fs::write(watched.join("a.txt"), "one\ntwo\n").unwrap();
            Self { temp_dir, watched }
        }

        fn file(&self) -> PathBuf {
            self.watched.join("a.txt")
        }

        fn cache_dir(&self) -> PathBuf {
            self.temp_dir.path().join("cache")
        }

        fn config(&self) -> WatchConfig {
            WatchConfig::new(vec![self.watched.clone()]).with_debounce(Duration::from_secs(1))
        }

        fn runtime(&self, config: WatchConfig) -> Runtime<ScriptedNotifier, MemoryConsole> {
            let mut runtime = Runtime::new(config, ScriptedNotifier::new(), MemoryConsole::new())
                .with_retry(RetryPolicy::immediate());
            runtime.populate();
            runtime
        }
    }

    fn wd(runtime: &Runtime<ScriptedNotifier, MemoryConsole>, path: &Path) -> u32 {
        runtime.tree().notifier().wd_of(path)
    }

    #[test]
    fn test_burst_triggers_once() {
        let fx = Fixture::new();
        let mut runtime = fx.runtime(fx.config());
        let file_wd = wd(&runtime, &fx.file());
        let start = Instant::now();

        let burst = vec![event(file_wd, EventMask::MODIFY); 3];
        runtime.handle_batch(burst, start).unwrap();
        assert_eq!(
            runtime.console().with_tone(Tone::Trigger),
            vec!["+ Trigger: [ Modified ]"]
        );
        assert!(runtime.console().with_tone(Tone::Muted).is_empty());

        // The next trigger reports what was swallowed
        let later = start + Duration::from_secs(2);
        runtime
            .handle_batch(vec![event(file_wd, EventMask::CLOSE_WRITE)], later)
            .unwrap();
        assert_eq!(
            runtime.console().texts(),
            vec![
                "+ Trigger: [ Modified ]",
                "+ Debounced: [ Modified, Modified ]",
                "+ Trigger: [ Close write ]",
            ]
        );
    }

    #[test]
    fn test_directory_events_never_trigger() {
        let fx = Fixture::new();
        let mut runtime = fx.runtime(fx.config());
        let dir_wd = wd(&runtime, &fx.watched);

        runtime
            .handle_batch(vec![event(dir_wd, EventMask::MODIFY)], Instant::now())
            .unwrap();
        assert!(runtime.console().lines().is_empty());
    }

    #[test]
    fn test_created_file_is_watched() {
        let fx = Fixture::new();
        let mut runtime = fx.runtime(fx.config());
        let dir_wd = wd(&runtime, &fx.watched);
        assert_eq!(runtime.tree().file_count(), 1);

        let new_file = fx.watched.join("b.txt");
        fs::write(&new_file, "b").unwrap();
        runtime
            .handle_batch(
                vec![child_event(dir_wd, EventMask::CREATE, "b.txt")],
                Instant::now(),
            )
            .unwrap();

        assert_eq!(runtime.tree().file_count(), 2);
        assert!(runtime.console().lines().is_empty());

        let new_wd = wd(&runtime, &new_file);
        runtime
            .handle_batch(vec![event(new_wd, EventMask::MODIFY)], Instant::now())
            .unwrap();
        assert_eq!(runtime.console().with_tone(Tone::Trigger).len(), 1);
    }

    #[test]
    fn test_created_subtree_is_watched() {
        let fx = Fixture::new();
        let mut runtime = fx.runtime(fx.config());
        let dir_wd = wd(&runtime, &fx.watched);

        fs::create_dir_all(fx.watched.join("pkg/deep")).unwrap();
        fs::write(fx.watched.join("pkg/deep/c.txt"), "c").unwrap();
        runtime
            .handle_batch(
                vec![child_event(dir_wd, EventMask::CREATE | EventMask::ISDIR, "pkg")],
                Instant::now(),
            )
            .unwrap();

        assert_eq!(runtime.tree().dir_count(), 3);
        assert_eq!(runtime.tree().file_count(), 2);
    }

    #[test]
    fn test_deleted_file_is_torn_down() {
        let fx = Fixture::new();
        let mut runtime = fx.runtime(fx.config().with_diff(fx.cache_dir()));
        let file_wd = wd(&runtime, &fx.file());
        let cached = fx.cache_dir().join("a.txt");
        assert!(cached.exists());

        fs::remove_file(fx.file()).unwrap();
        runtime
            .handle_batch(vec![event(file_wd, EventMask::DELETE_SELF)], Instant::now())
            .unwrap();

        assert_eq!(runtime.tree().file_count(), 0);
        assert!(!cached.exists());
        assert!(runtime.console().with_tone(Tone::Trigger).is_empty());
        assert!(runtime.tree().notifier().removed.contains(&file_wd));
    }

    #[test]
    fn test_replace_on_save_rewatches_without_trigger_line() {
        let fx = Fixture::new();
        let mut runtime = fx.runtime(fx.config().with_diff(fx.cache_dir()));
        let start = Instant::now();
        let old_wd = wd(&runtime, &fx.file());

        runtime
            .handle_batch(vec![event(old_wd, EventMask::MODIFY)], start)
            .unwrap();
        runtime.console_mut().clear();

        fs::write(fx.file(), "one\nthree\n").unwrap();
        runtime.tree_mut().notifier_mut().expire(&fx.file());
        let soon = start + Duration::from_millis(10);
        runtime
            .handle_batch(vec![event(old_wd, EventMask::IGNORED)], soon)
            .unwrap();

        let new_wd = wd(&runtime, &fx.file());
        assert_ne!(new_wd, old_wd);
        assert!(runtime.tree().entry(old_wd).is_none());
        assert_eq!(
            runtime.tree().entry(new_wd).unwrap().cached,
            Some(fx.cache_dir().join("a.txt"))
        );
        // Forced through the window, but silent
        assert!(runtime.console().with_tone(Tone::Trigger).is_empty());
        // The content change was still diffed into the snapshot
        assert_eq!(
            fs::read_to_string(fx.cache_dir().join("a.txt")).unwrap(),
            "one\nthree\n"
        );
    }

    #[test]
    fn test_modify_diffs_against_snapshot() {
        let fx = Fixture::new();
        let log = fx.temp_dir.path().join("changes.log");
        let config = fx
            .config()
            .with_diff(fx.cache_dir())
            .with_log_file(&log)
            .with_verbose(true);
        let mut runtime = fx.runtime(config);
        let file_wd = wd(&runtime, &fx.file());

        fs::write(fx.file(), "one\n2\n").unwrap();
        runtime
            .handle_batch(vec![event(file_wd, EventMask::MODIFY)], Instant::now())
            .unwrap();

        assert_eq!(runtime.console().with_tone(Tone::Removed), vec!["-2: two"]);
        assert_eq!(runtime.console().with_tone(Tone::Added), vec!["+2: 2"]);
        assert!(fs::read_to_string(&log).unwrap().contains("Event: Modified"));
    }

    #[test]
    fn test_buffered_events_are_not_diffed() {
        let fx = Fixture::new();
        let config = fx.config().with_diff(fx.cache_dir()).with_verbose(true);
        let mut runtime = fx.runtime(config);
        let file_wd = wd(&runtime, &fx.file());
        let cached = fx.cache_dir().join("a.txt");
        let start = Instant::now();

        fs::write(fx.file(), "one\n2\n").unwrap();
        runtime
            .handle_batch(vec![event(file_wd, EventMask::MODIFY)], start)
            .unwrap();
        fs::write(fx.file(), "one\n3\n").unwrap();
        runtime
            .handle_batch(
                vec![event(file_wd, EventMask::MODIFY)],
                start + Duration::from_millis(100),
            )
            .unwrap();

        assert_eq!(runtime.console().with_tone(Tone::Trigger).len(), 1);
        assert_eq!(runtime.console().with_tone(Tone::Added), vec!["+2: 2"]);
        assert_eq!(fs::read_to_string(&cached).unwrap(), "one\n2\n");

        // The next run diffs everything that piled up in the window
        runtime.console_mut().clear();
        runtime
            .handle_batch(
                vec![event(file_wd, EventMask::MODIFY)],
                start + Duration::from_secs(2),
            )
            .unwrap();
        assert_eq!(runtime.console().with_tone(Tone::Removed), vec!["-2: 2"]);
        assert_eq!(runtime.console().with_tone(Tone::Added), vec!["+2: 3"]);
        assert_eq!(fs::read_to_string(&cached).unwrap(), "one\n3\n");
    }

    #[test]
    fn test_attrib_does_not_diff() {
        let fx = Fixture::new();
        let config = fx.config().with_diff(fx.cache_dir()).with_verbose(true);
        let mut runtime = fx.runtime(config);
        let file_wd = wd(&runtime, &fx.file());

        fs::write(fx.file(), "changed\n").unwrap();
        runtime
            .handle_batch(vec![event(file_wd, EventMask::ATTRIB)], Instant::now())
            .unwrap();

        assert_eq!(
            runtime.console().texts(),
            vec!["+ Trigger: [ Attributes ]"]
        );
        assert_eq!(
            fs::read_to_string(fx.cache_dir().join("a.txt")).unwrap(),
            "one\ntwo\n"
        );
    }

    #[test]
    fn test_queue_overflow_is_reported() {
        let fx = Fixture::new();
        let mut runtime = fx.runtime(fx.config());

        runtime
            .handle_batch(vec![event(0, EventMask::Q_OVERFLOW)], Instant::now())
            .unwrap();
        assert_eq!(runtime.console().with_tone(Tone::Error).len(), 1);
    }

    #[test]
    fn test_trigger_runs_command() {
        let fx = Fixture::new();
        let marker = fx.temp_dir.path().join("ran");
        let config = fx
            .config()
            .with_command(format!("touch '{}'", marker.display()));
        let mut runtime = fx.runtime(config);
        let file_wd = wd(&runtime, &fx.file());

        runtime
            .handle_batch(vec![event(file_wd, EventMask::MODIFY)], Instant::now())
            .unwrap();
        assert!(runtime.supervisor().current().is_some());

        for _ in 0..200 {
            if marker.exists() {
                break;
            }
            sleep(Duration::from_millis(10));
        }
        assert!(marker.exists());
    }

    #[test]
    fn test_run_until_shutdown() {
        let fx = Fixture::new();
        let stop = Arc::new(AtomicBool::new(false));
        let config = fx.config().with_diff(fx.cache_dir());

        let notifier = ScriptedNotifier::new().stop_when_drained(Arc::clone(&stop));
        let mut runtime = Runtime::new(config, notifier, MemoryConsole::new());
        runtime.populate();
        let file_wd = wd(&runtime, &fx.file());
        runtime
            .tree_mut()
            .notifier_mut()
            .push(vec![event(file_wd, EventMask::MODIFY)]);

        runtime.run(&stop).unwrap();

        assert!(runtime.is_closed());
        assert_eq!(
            runtime.console().texts(),
            vec![
                "+ Trigger: [ Modified ]".to_string(),
                "+ Exiting sqwatch...".to_string(),
                format!("+ Wiping cache directory: {}", fx.cache_dir().display()),
                "+ Removing watches".to_string(),
            ]
        );
        assert!(!fx.cache_dir().exists());
        assert_eq!(runtime.tree().notifier().watch_count(), 0);
    }

    #[test]
    fn test_wake_ends_idle_run() {
        let fx = Fixture::new();
        let stop = Arc::new(AtomicBool::new(false));
        let pipe = WakePipe::new().unwrap();
        let sender = pipe.sender().unwrap();

        let notifier = InotifyNotifier::new().unwrap();
        let mut runtime =
            Runtime::new(fx.config(), notifier, MemoryConsole::new()).with_wake(pipe);
        runtime.populate();

        // Raised after the loop checked the flag, with no signal to
        // interrupt the read
        let requester = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                sleep(Duration::from_millis(200));
                stop.store(true, Ordering::SeqCst);
                crate::wake::wake(&sender);
            })
        };

        runtime.run(&stop).unwrap();
        requester.join().unwrap();

        assert!(runtime.is_closed());
        assert!(runtime.console().texts().contains(&"+ Exiting sqwatch..."));
    }

    #[test]
    fn test_events_still_flow_with_wake_attached() {
        let fx = Fixture::new();
        let stop = Arc::new(AtomicBool::new(false));
        let pipe = WakePipe::new().unwrap();
        let sender = pipe.sender().unwrap();

        let notifier = InotifyNotifier::new().unwrap();
        let mut runtime =
            Runtime::new(fx.config(), notifier, MemoryConsole::new()).with_wake(pipe);
        runtime.populate();

        let file = fx.file();
        let requester = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                sleep(Duration::from_millis(100));
                fs::write(&file, "changed\n").unwrap();
                sleep(Duration::from_millis(300));
                stop.store(true, Ordering::SeqCst);
                crate::wake::wake(&sender);
            })
        };

        runtime.run(&stop).unwrap();
        requester.join().unwrap();

        assert_eq!(
            runtime.console().with_tone(Tone::Trigger),
            vec!["+ Trigger: [ Modified ]"]
        );
    }

    #[test]
    fn test_read_error_is_fatal() {
        let fx = Fixture::new();
        let mut notifier = ScriptedNotifier::new();
        notifier.push_error(io::Error::from(io::ErrorKind::InvalidData));
        let mut runtime = Runtime::new(fx.config(), notifier, MemoryConsole::new());
        runtime.populate();

        let err = runtime.run(&AtomicBool::new(false)).unwrap_err();
        assert!(matches!(err, WatchError::Read(_)));
        assert!(runtime.is_closed());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let fx = Fixture::new();
        let mut runtime = fx.runtime(fx.config());

        runtime.shutdown();
        runtime.shutdown();
        assert_eq!(
            runtime
                .console()
                .texts()
                .iter()
                .filter(|text| text.starts_with("+ Exiting"))
                .count(),
            1
        );
    }
}
