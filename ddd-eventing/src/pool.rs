//! 工作池（WorkerPool）
//!
//! 固定容量的任务池：`JoinSet` 作为完成通道，`Semaphore` 约束并发上限。
//! 每个任务持有一个许可直至结束，因此存活任务数永远不超过容量；
//! 由调用方（监督者）在任务退出后决定是否补位。
//!
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

pub struct WorkerPool<T> {
    capacity: usize,
    permits: Arc<Semaphore>,
    tasks: JoinSet<T>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            permits: Arc::new(Semaphore::new(capacity)),
            tasks: JoinSet::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前仍持有许可（尚未结束）的任务数
    pub fn active(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// 尚未被 `join_next` 取走的任务数（含已结束未回收的）
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// 在有空余许可时启动一个任务；池已满时返回 false
    pub fn spawn<F>(&mut self, task: F) -> bool
    where
        F: Future<Output = T> + Send + 'static,
    {
        let Ok(permit) = self.permits.clone().try_acquire_owned() else {
            return false;
        };

        self.tasks.spawn(async move {
            let _permit = permit;
            task.await
        });
        true
    }

    /// 补齐到容量上限，返回新启动的任务数
    pub fn fill<F, Fut>(&mut self, mut make: F) -> usize
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut spawned = 0;
        while self.permits.available_permits() > 0 {
            if !self.spawn(make()) {
                break;
            }
            spawned += 1;
        }
        spawned
    }

    /// 等待下一个任务结束；池为空时立即返回 None
    pub async fn join_next(&mut self) -> Option<Result<T, JoinError>> {
        self.tasks.join_next().await
    }

    /// 放弃对剩余任务的管理，任务继续在后台运行至自然结束
    pub fn detach_all(&mut self) {
        self.tasks.detach_all();
    }
}
