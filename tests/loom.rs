//! Exhaustive small-interleaving exploration of the reclamation protocol.
//!
//! Build with `RUSTFLAGS="--cfg loom" cargo test --test loom --release`.
#![cfg(loom)]

use loom::sync::Arc;
use loom::thread;

use strand::{LockFreeQueue, LockFreeStack};

#[test]
fn stack_two_poppers_take_distinct_values() {
    loom::model(|| {
        let stack = Arc::new(LockFreeStack::new());
        stack.push(1);
        stack.push(2);

        let a = {
            let stack = Arc::clone(&stack);
            thread::spawn(move || stack.pop())
        };
        let b = {
            let stack = Arc::clone(&stack);
            thread::spawn(move || stack.pop())
        };

        let mut got = vec![a.join().unwrap(), b.join().unwrap()];
        got.sort();
        assert_eq!(got, vec![Some(1), Some(2)]);
    });
}

#[test]
fn stack_push_races_pop() {
    loom::model(|| {
        let stack = Arc::new(LockFreeStack::new());
        let pusher = {
            let stack = Arc::clone(&stack);
            thread::spawn(move || stack.push(7))
        };
        let popper = {
            let stack = Arc::clone(&stack);
            thread::spawn(move || stack.pop())
        };
        pusher.join().unwrap();

        // The racing popper gets the value or empty, never anything else.
        match popper.join().unwrap() {
            Some(value) => {
                assert_eq!(value, 7);
                assert_eq!(stack.pop(), None);
            }
            None => assert_eq!(stack.pop(), Some(7)),
        }
    });
}

#[test]
fn queue_two_extractors_take_distinct_values() {
    loom::model(|| {
        let queue = Arc::new(LockFreeQueue::new());
        queue.enqueue(1);
        queue.enqueue(2);

        let a = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.extract_front())
        };
        let b = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.extract_front())
        };

        let mut got = vec![a.join().unwrap(), b.join().unwrap()];
        got.sort();
        assert_eq!(got, vec![Some(1), Some(2)]);
    });
}

#[test]
fn queue_two_enqueuers_help_each_other() {
    loom::model(|| {
        let queue = Arc::new(LockFreeQueue::new());
        let a = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.enqueue(1))
        };
        let b = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.enqueue(2))
        };
        a.join().unwrap();
        b.join().unwrap();

        let mut got = vec![
            queue.extract_front().unwrap(),
            queue.extract_front().unwrap(),
        ];
        assert_eq!(queue.extract_front(), None);
        got.sort_unstable();
        assert_eq!(got, vec![1, 2]);
    });
}

#[test]
fn queue_enqueue_races_extract() {
    loom::model(|| {
        let queue = Arc::new(LockFreeQueue::new());
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.enqueue(7))
        };
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.extract_front())
        };
        producer.join().unwrap();

        match consumer.join().unwrap() {
            Some(value) => {
                assert_eq!(value, 7);
                assert_eq!(queue.extract_front(), None);
            }
            None => assert_eq!(queue.extract_front(), Some(7)),
        }
    });
}
