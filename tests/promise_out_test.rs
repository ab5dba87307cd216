#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use promise_out::executor::{ManualExecutor, ThreadPool, ThreadPoolConfig};
    use promise_out::{launch, pair, Error, Failure, Producer};
    use std::sync::mpsc::channel;
    use std::sync::{Arc, Barrier};
    use std::{thread, time::Duration};

    fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .try_init();
    }

    #[test]
    fn test_promise_out() {
        init_logging();
        let promise = Producer::<i32>::new();
        let consumer = promise.derive_consumer().unwrap();

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            promise.resolve_value(42).unwrap();
        });

        let result = consumer.await_blocking().unwrap();
        assert_eq!(result, 42);
    }

    #[test]
    fn test_blocked_consumer_wakes_on_abandon() {
        init_logging();
        let (promise, consumer) = pair::new::<i32>();

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            drop(promise);
        });

        assert!(matches!(consumer.await_blocking(), Err(Error::ProducerDropped)));
    }

    #[test]
    fn test_many_pairs_across_threads() {
        init_logging();
        const PAIRS: usize = 64;
        let pool = Arc::new(
            ThreadPool::new(
                ThreadPoolConfig::builder()
                    .workers(4)
                    .thread_name_prefix("stress")
                    .build()
                    .unwrap(),
            )
            .unwrap(),
        );

        let mut producers = Vec::with_capacity(PAIRS);
        let mut blocking = Vec::new();
        let (tx, rx) = channel();

        for i in 0..PAIRS {
            let (producer, consumer) = pair::new::<usize>();
            producers.push((i, producer));
            if i % 2 == 0 {
                blocking.push(thread::spawn(move || (i, consumer.await_blocking().unwrap())));
            } else {
                let tx = tx.clone();
                consumer
                    .subscribe(move |outcome| tx.send((i, outcome.unwrap())).unwrap(), pool.clone())
                    .unwrap();
            }
        }
        drop(tx);

        let resolvers: Vec<_> = producers
            .into_iter()
            .map(|(i, producer)| {
                thread::spawn(move || producer.resolve_value(i * 1000).unwrap())
            })
            .collect();
        for resolver in resolvers {
            resolver.join().expect("The resolver thread has panicked");
        }

        let mut seen = 0;
        for handle in blocking {
            let (i, value) = handle.join().expect("The consumer thread has panicked");
            assert_eq!(value, i * 1000);
            seen += 1;
        }
        for (i, value) in rx.iter() {
            assert_eq!(value, i * 1000);
            seen += 1;
        }
        assert_eq!(seen, PAIRS);
    }

    #[test]
    fn test_subscribe_races_resolve() {
        init_logging();
        const ROUNDS: usize = 1000;
        let pool = Arc::new(ThreadPool::with_workers(4).unwrap());
        let (tx, rx) = channel();

        for round in 0..ROUNDS {
            let (producer, consumer) = pair::new::<usize>();
            let barrier = Arc::new(Barrier::new(2));

            let subscriber_barrier = barrier.clone();
            let subscriber_pool = pool.clone();
            let tx = tx.clone();
            let subscriber = thread::spawn(move || {
                subscriber_barrier.wait();
                consumer
                    .subscribe(move |outcome| tx.send((round, outcome.unwrap())).unwrap(), subscriber_pool)
                    .unwrap();
            });
            let resolver = thread::spawn(move || {
                barrier.wait();
                producer.resolve_value(round).unwrap();
            });

            subscriber.join().expect("The subscriber thread has panicked");
            resolver.join().expect("The resolver thread has panicked");
        }
        drop(tx);

        let mut fired = vec![0usize; ROUNDS];
        for (round, value) in rx.iter() {
            assert_eq!(value, round);
            fired[round] += 1;
        }
        assert!(fired.iter().all(|&count| count == 1));
    }

    #[test]
    fn test_many_launched_tasks_on_pool() {
        init_logging();
        let pool = Arc::new(ThreadPool::with_workers(4).unwrap());
        let mut producers = Vec::new();
        let mut outers = Vec::new();

        for i in 0..32u64 {
            let (producer, consumer) = pair::new::<u64>();
            let resume_on = pool.clone();
            outers.push((
                i,
                launch(pool.clone(), async move {
                    let value = consumer.resume_on(resume_on).await?;
                    Ok::<_, Error>(value + 1)
                }),
            ));
            producers.push((i, producer));
        }

        let resolver = thread::spawn(move || {
            for (i, producer) in producers {
                producer.resolve_value(i * 2).unwrap();
            }
        });

        for (i, outer) in outers {
            assert_eq!(outer.await_blocking().unwrap(), i * 2 + 1);
        }
        resolver.join().expect("The resolver thread has panicked");
    }

    #[test]
    fn test_launched_body_handles_inner_failure() {
        init_logging();
        let executor = ManualExecutor::new();
        let (inner, inner_consumer) = pair::new::<String>();
        let resume_on = executor.clone();
        let outer = launch(executor.clone(), async move {
            match inner_consumer.resume_on(resume_on).await {
                Ok(value) => Ok(value),
                Err(Error::Failed(failure)) => Ok(format!("recovered from {failure}")),
                Err(err) => Err(err),
            }
        });

        inner.resolve_failure(Failure::msg("timeout")).unwrap();
        executor.run_until_idle();
        assert_eq!(outer.await_blocking().unwrap(), "recovered from timeout");
    }

    #[test]
    fn test_block_on_resume() {
        init_logging();
        let pool = Arc::new(ThreadPool::with_workers(1).unwrap());
        let (promise, consumer) = pair::new::<&'static str>();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            promise.resolve_value("🍓").unwrap();
        });
        assert_eq!(block_on(consumer.resume_on(pool)).unwrap(), "🍓");
    }
}
