use std::collections::VecDeque;

use proptest::prelude::*;
use strand::{LockFreeQueue, LockFreeStack};

#[derive(Debug, Clone)]
enum Op {
    Insert(u16),
    Remove,
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(
        prop_oneof![any::<u16>().prop_map(Op::Insert), Just(Op::Remove)],
        1..200,
    )
}

proptest! {
    #[test]
    fn stack_matches_vec_model(ops in ops()) {
        let mut model = Vec::new();
        let stack = LockFreeStack::new();

        for op in ops {
            match op {
                Op::Insert(value) => {
                    model.push(value);
                    stack.push(value);
                }
                Op::Remove => {
                    prop_assert_eq!(stack.pop(), model.pop());
                }
            }
            prop_assert_eq!(stack.is_empty(), model.is_empty());
        }
        while let Some(expected) = model.pop() {
            prop_assert_eq!(stack.pop(), Some(expected));
        }
        prop_assert_eq!(stack.pop(), None);
    }

    #[test]
    fn queue_matches_deque_model(ops in ops()) {
        let mut model = VecDeque::new();
        let queue = LockFreeQueue::new();

        for op in ops {
            match op {
                Op::Insert(value) => {
                    model.push_back(value);
                    queue.enqueue(value);
                }
                Op::Remove => {
                    prop_assert_eq!(queue.extract_front(), model.pop_front());
                }
            }
            prop_assert_eq!(queue.is_empty(), model.is_empty());
        }
        while let Some(expected) = model.pop_front() {
            prop_assert_eq!(queue.extract_front(), Some(expected));
        }
        prop_assert_eq!(queue.extract_front(), None);
    }
}
