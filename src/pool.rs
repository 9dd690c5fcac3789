// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 固定大小线程池
//!
//! 线程池持有 N 个长期存活的工作线程和一个 FIFO 任务队列：
//! - 队列由一把互斥锁保护，配合两个条件变量：`not_empty`（空闲的工作线程在此等待）
//!   与 `empty`（停机流程在此等待队列被取空）。
//! - 停机遵循“先排空、后停止”：先拒绝新任务，等待已提交的任务全部被取走，
//!   再设置停止标志并唤醒所有线程，最后逐个 join。
//! - 工作线程只有在“已停止且队列为空”时才会退出，因此停机前提交的任务一定会被执行。

use log::{debug, error, warn};

use std::{
    collections::VecDeque,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Condvar, Mutex, MutexGuard},
    thread::{self, JoinHandle},
};

use crate::{exception::Exception, param::MAX_POOL_SIZE};

/// 线程池中的一个任务。任务只会被一个工作线程执行一次。
pub type Job = Box<dyn FnOnce() + Send + 'static>;

struct Queue {
    jobs: VecDeque<Job>,
    /// 为 false 时进入排空阶段，新任务被直接丢弃
    accepting: bool,
    /// 为 true 时工作线程在队列为空后退出
    stopped: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    not_empty: Condvar,
    empty: Condvar,
}

impl Shared {
    // 任务在锁外执行，锁被污染时队列本身仍然一致，直接恢复即可
    fn lock(&self) -> MutexGuard<'_, Queue> {
        match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("任务队列锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }
}

pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl ThreadPool {
    /// 创建一个包含 `size` 个工作线程的线程池。
    ///
    /// `size` 超过 [`MAX_POOL_SIZE`] 时返回 `InvalidPoolSize`，且不会创建任何线程。
    /// 任何一个线程创建失败，已启动的线程会被停止并回收，返回 `PoolCreationFailed`。
    pub fn new(size: usize) -> Result<Self, Exception> {
        if size > MAX_POOL_SIZE {
            error!("非法的线程池大小：{}，允许范围为[0, {}]", size, MAX_POOL_SIZE);
            return Err(Exception::InvalidPoolSize);
        }

        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                jobs: VecDeque::new(),
                accepting: true,
                stopped: false,
            }),
            not_empty: Condvar::new(),
            empty: Condvar::new(),
        });

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let shared_clone = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("proxy-worker-{}", id))
                .spawn(move || work(id, shared_clone));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    error!("无法创建第{}个工作线程：{}", id, e);
                    stop_and_join(&shared, workers);
                    return Err(Exception::PoolCreationFailed);
                }
            }
        }
        debug!("线程池已创建，工作线程数：{}", size);

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            size,
        })
    }

    /// 提交一个任务。
    ///
    /// 线程池进入排空阶段后提交的任务会被静默丢弃。
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut queue = self.shared.lock();
        if !queue.accepting {
            debug!("线程池正在停机，丢弃新提交的任务");
            return;
        }
        queue.jobs.push_back(Box::new(f));
        self.shared.not_empty.notify_one();
    }

    /// 排空队列并停止所有工作线程。
    ///
    /// 返回时，调用前已提交的所有任务都已执行完毕。重复调用不会产生额外效果。
    pub fn shutdown(&self) {
        {
            let mut queue = self.shared.lock();
            queue.accepting = false;

            if self.size == 0 && !queue.jobs.is_empty() {
                warn!("线程池没有工作线程，丢弃{}个未执行的任务", queue.jobs.len());
                queue.jobs.clear();
            }

            while !queue.jobs.is_empty() {
                queue = match self.shared.empty.wait(queue) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }
            queue.stopped = true;
            self.shared.not_empty.notify_all();
        }

        let handles: Vec<JoinHandle<()>> = match self.workers.lock() {
            Ok(mut workers) => workers.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            if handle.join().is_err() {
                error!("工作线程异常退出");
            }
        }
        debug!("线程池已停止");
    }

    /// 工作线程数
    pub fn size(&self) -> usize {
        self.size
    }

    /// 线程池是否仍接受新任务
    pub fn is_accepting(&self) -> bool {
        self.shared.lock().accepting
    }

    /// 队列中等待执行的任务数
    pub fn queued(&self) -> usize {
        self.shared.lock().jobs.len()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn stop_and_join(shared: &Shared, workers: Vec<JoinHandle<()>>) {
    {
        let mut queue = shared.lock();
        queue.accepting = false;
        queue.stopped = true;
        shared.not_empty.notify_all();
    }
    for handle in workers {
        let _ = handle.join();
    }
}

/// 工作线程主循环
fn work(id: usize, shared: Arc<Shared>) {
    loop {
        let job = {
            let mut queue = shared.lock();

            // 被唤醒后重新检查两个条件，避免虚假唤醒
            while queue.jobs.is_empty() && !queue.stopped {
                queue = match shared.not_empty.wait(queue) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }

            let job = match queue.jobs.pop_front() {
                Some(job) => job,
                // 队列为空且已停止
                None => break,
            };
            if queue.jobs.is_empty() {
                shared.empty.notify_all();
            }
            job
        };

        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("工作线程{}执行的任务发生panic", id);
        }
    }
    debug!("工作线程{}退出", id);
}
