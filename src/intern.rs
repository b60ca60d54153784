//! Interning of the entities reconstructed from the trace.
//!
//! Processes, threads and names are created the first time they are
//! observed and live for the rest of the run; repeated observations of the
//! same identity key return the already interned object. Names are keyed by
//! pid alone: two name observations sharing a pid intern to the same entry
//! and the first observed text wins.

use std::collections::HashMap;

/// An interned thread-name identity observed in sched-switch entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    pub pid: i32,
    pub text: String,
}

/// A process reconstructed from a process-create entry.
///
/// `ordinal` is the assignment order (position in the creation sequence),
/// used to group threads under their process in display order.
#[derive(Debug)]
pub struct SystemProcess {
    pub pid: i32,
    pub name: String,
    pub ordinal: usize,
    /// Indices into the thread table, in registration order.
    pub threads: Vec<usize>,
}

/// A thread reconstructed from a thread-create entry.
///
/// `actions` holds the entry indices of every sched-switch where this
/// thread appeared as the outgoing or incoming side, kept non-decreasing in
/// timestamp by local repair on append.
#[derive(Debug)]
pub struct SystemThread {
    pub tid: i32,
    pub pid: i32,
    pub name: String,
    /// Index of the owning process in the process table.
    pub process: usize,
    /// Position in the finalized display order; reassigned after each
    /// ingestion cycle.
    pub ordinal: usize,
    pub actions: Vec<usize>,
}

impl SystemThread {
    /// Append an action index, repairing a local timestamp inversion by
    /// swapping backwards until the sequence is non-decreasing again.
    /// Concurrent ring-buffer writers can produce single adjacent-pair
    /// inversions; larger disorder is not corrected here.
    ///
    /// Returns true if a repair took place.
    pub fn add_action(&mut self, at: usize, ns_of: impl Fn(usize) -> u64) -> bool {
        self.actions.push(at);
        let mut n = self.actions.len() - 1;
        let mut repaired = false;
        while n > 0 && ns_of(self.actions[n]) < ns_of(self.actions[n - 1]) {
            self.actions.swap(n, n - 1);
            n -= 1;
            repaired = true;
        }
        repaired
    }
}

/// Tables of interned entities plus the finalized thread display order.
#[derive(Debug, Default)]
pub struct EntityInterner {
    names_by_pid: HashMap<i32, usize>,
    names: Vec<Name>,
    processes_by_pid: HashMap<i32, usize>,
    processes: Vec<SystemProcess>,
    threads_by_tid: HashMap<i32, usize>,
    threads: Vec<SystemThread>,
    /// Thread indices sorted for display; rebuilt by `finalize_order`.
    display: Vec<usize>,
}

impl EntityInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a name observation. Returns the index of the interned entry;
    /// an existing entry with the same pid is reused.
    pub fn intern_name(&mut self, pid: i32, text: impl FnOnce() -> String) -> usize {
        if let Some(&i) = self.names_by_pid.get(&pid) {
            return i;
        }
        let i = self.names.len();
        self.names.push(Name { pid, text: text() });
        self.names_by_pid.insert(pid, i);
        i
    }

    /// Intern a process. The ordinal is its position in assignment order.
    pub fn intern_process(&mut self, pid: i32, name: String) -> usize {
        if let Some(&i) = self.processes_by_pid.get(&pid) {
            return i;
        }
        let i = self.processes.len();
        self.processes.push(SystemProcess {
            pid,
            name,
            ordinal: i,
            threads: Vec::new(),
        });
        self.processes_by_pid.insert(pid, i);
        i
    }

    /// Intern a thread and register it with its owning process.
    pub fn intern_thread(&mut self, tid: i32, pid: i32, name: String, process: usize) -> usize {
        if let Some(&i) = self.threads_by_tid.get(&tid) {
            return i;
        }
        let i = self.threads.len();
        self.threads.push(SystemThread {
            tid,
            pid,
            name,
            process,
            ordinal: i,
            actions: Vec::new(),
        });
        self.threads_by_tid.insert(tid, i);
        self.processes[process].threads.push(i);
        i
    }

    pub fn name(&self, i: usize) -> &Name {
        &self.names[i]
    }

    pub fn process_by_pid(&self, pid: i32) -> Option<usize> {
        self.processes_by_pid.get(&pid).copied()
    }

    pub fn thread_by_tid(&self, tid: i32) -> Option<usize> {
        self.threads_by_tid.get(&tid).copied()
    }

    pub fn process(&self, i: usize) -> &SystemProcess {
        &self.processes[i]
    }

    pub fn processes(&self) -> &[SystemProcess] {
        &self.processes
    }

    pub fn thread(&self, i: usize) -> &SystemThread {
        &self.threads[i]
    }

    pub fn thread_mut(&mut self, i: usize) -> &mut SystemThread {
        &mut self.threads[i]
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Thread indices in display order. Meaningful after `finalize_order`.
    pub fn display_order(&self) -> &[usize] {
        &self.display
    }

    /// Threads in display order.
    pub fn threads_in_display_order(&self) -> impl Iterator<Item = &SystemThread> {
        self.display.iter().map(move |&i| &self.threads[i])
    }

    /// Recompute the display order: first by (pid, tid), then stably by
    /// (owning process ordinal, tid), so threads group under their process
    /// in process-creation order while keeping tid order within a process.
    /// Each thread's ordinal is its position in the final order.
    pub fn finalize_order(&mut self) {
        if self.display.len() != self.threads.len() {
            self.display = (0..self.threads.len()).collect();
        }
        let threads = &self.threads;
        self.display
            .sort_by_key(|&i| (threads[i].pid, threads[i].tid));
        let processes = &self.processes;
        self.display
            .sort_by_key(|&i| (processes[threads[i].process].ordinal, threads[i].tid));
        for (n, &i) in self.display.iter().enumerate() {
            self.threads[i].ordinal = n;
        }
    }
}
