use std::sync::Arc;

pub(crate) type Handler<R> = Arc<dyn Fn(R) + Send + Sync>;

/// One operation in flight, identified by its key object, together with the
/// callbacks waiting for its outcome.
pub(crate) struct ProcessCallbacksHolder<O, R> {
    object: O,
    completion_handlers: Vec<Handler<R>>,
}

impl<O, R: Clone> ProcessCallbacksHolder<O, R> {
    pub(crate) fn new(object: O, handlers: Vec<Handler<R>>) -> Self {
        Self {
            object,
            completion_handlers: handlers,
        }
    }

    pub(crate) fn add_handler(&mut self, handler: Handler<R>) {
        self.completion_handlers.push(handler);
    }

    pub(crate) fn waiters_count(&self) -> usize {
        self.completion_handlers.len()
    }

    /// The registered handlers, for notifying without holding on to the
    /// registry.
    pub(crate) fn handlers(&self) -> Vec<Handler<R>> {
        self.completion_handlers.clone()
    }

    /// Calls every handler, in registration order, on the current thread.
    pub(crate) fn notify_waiters(&self, result: R) {
        for completion in &self.completion_handlers {
            completion(result.clone());
        }
    }
}

/// Registry of in-flight processes.
///
/// Does not enforce one process per key; callers check with
/// [`ProcessesManager::process_where`] before adding.
pub(crate) struct ProcessesManager<O, R> {
    processes: Vec<ProcessCallbacksHolder<O, R>>,
}

impl<O, R> Default for ProcessesManager<O, R> {
    fn default() -> Self {
        Self {
            processes: Vec::new(),
        }
    }
}

impl<O: PartialEq, R: Clone> ProcessesManager<O, R> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_process(&mut self, process: ProcessCallbacksHolder<O, R>) {
        self.processes.push(process);
    }

    /// Notifies the waiters of the first process matching `predicate` and
    /// removes it.
    pub(crate) fn complete_where(&mut self, predicate: impl Fn(&O) -> bool, result: R) {
        if let Some(process) = self.take_where(predicate) {
            process.notify_waiters(result);
        }
    }

    pub(crate) fn complete_process_of_object(&mut self, object: &O, result: R) {
        self.complete_where(|o| o == object, result);
    }

    /// Removes the first process matching `predicate` without notifying it,
    /// handing it to the caller.
    pub(crate) fn take_where(
        &mut self,
        predicate: impl Fn(&O) -> bool,
    ) -> Option<ProcessCallbacksHolder<O, R>> {
        let index = self.processes.iter().position(|p| predicate(&p.object))?;
        Some(self.processes.remove(index))
    }

    pub(crate) fn process_where(
        &self,
        predicate: impl Fn(&O) -> bool,
    ) -> Option<&ProcessCallbacksHolder<O, R>> {
        self.processes.iter().find(|p| predicate(&p.object))
    }

    pub(crate) fn process_where_mut(
        &mut self,
        predicate: impl Fn(&O) -> bool,
    ) -> Option<&mut ProcessCallbacksHolder<O, R>> {
        self.processes.iter_mut().find(|p| predicate(&p.object))
    }

    pub(crate) fn object_where(&self, predicate: impl Fn(&O) -> bool) -> Option<&O> {
        self.process_where(predicate).map(|p| &p.object)
    }

    /// Drops the process without notifying its waiters.
    pub(crate) fn remove_process(&mut self, object: &O) {
        if let Some(index) = self.processes.iter().position(|p| &p.object == object) {
            self.processes.remove(index);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.processes.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Handler<u32> {
        let log = log.clone();
        Arc::new(move |result| log.lock().unwrap().push(format!("{name}:{result}")))
    }

    #[test]
    fn completes_all_waiters_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = ProcessesManager::<String, u32>::new();
        let mut process = ProcessCallbacksHolder::new("a".to_string(), vec![recorder(&log, "first")]);
        process.add_handler(recorder(&log, "second"));
        manager.add_process(process);
        manager.process_where_mut(|o| o == "a").unwrap().add_handler(recorder(&log, "third"));

        manager.complete_process_of_object(&"a".to_string(), 7);

        assert_eq!(*log.lock().unwrap(), vec!["first:7", "second:7", "third:7"]);
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn completing_unknown_key_is_a_noop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = ProcessesManager::<String, u32>::new();
        manager.add_process(ProcessCallbacksHolder::new("a".to_string(), vec![recorder(&log, "a")]));

        manager.complete_where(|o| o == "b", 1);

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn lookups_do_not_mutate() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = ProcessesManager::<String, u32>::new();
        manager.add_process(ProcessCallbacksHolder::new("a".to_string(), vec![recorder(&log, "a")]));

        assert_eq!(manager.object_where(|o| o.starts_with('a')), Some(&"a".to_string()));
        manager.process_where(|o| o == "a").unwrap().notify_waiters(3);

        assert_eq!(manager.len(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["a:3"]);
    }

    #[test]
    fn remove_process_skips_waiters() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = ProcessesManager::<String, u32>::new();
        manager.add_process(ProcessCallbacksHolder::new("a".to_string(), vec![recorder(&log, "a")]));

        manager.remove_process(&"a".to_string());

        assert_eq!(manager.len(), 0);
        assert!(log.lock().unwrap().is_empty());
    }
}
