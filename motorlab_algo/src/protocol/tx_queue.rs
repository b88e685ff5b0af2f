//! Outgoing byte queue between the main loop and the transmit interrupt.

use core::fmt;

use heapless::spsc::Producer;

/// Formats replies into a single-producer byte queue.
///
/// `kick` is called after every write and whenever the queue is full; it must
/// get the consumer side draining (on the target it pends the UART interrupt).
/// A full queue makes the writer wait, never drop bytes.
pub struct QueuedWriter<'a, 'q, const N: usize, F: FnMut()> {
    tx: &'a mut Producer<'q, u8, N>,
    kick: F,
}

impl<'a, 'q, const N: usize, F: FnMut()> QueuedWriter<'a, 'q, N, F> {
    pub fn new(tx: &'a mut Producer<'q, u8, N>, kick: F) -> Self {
        Self { tx, kick }
    }
}

impl<const N: usize, F: FnMut()> fmt::Write for QueuedWriter<'_, '_, N, F> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for &byte in s.as_bytes() {
            let mut pending = byte;
            while let Err(back) = self.tx.enqueue(pending) {
                pending = back;
                (self.kick)();
            }
        }
        (self.kick)();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use core::fmt::Write;
    use heapless::spsc::Queue;

    #[test]
    fn test_line_longer_than_queue_is_delivered_whole() {
        let mut queue: Queue<u8, 8> = Queue::new();
        let (mut prod, cons) = queue.split();
        let cons = RefCell::new(cons);
        let sent = RefCell::new(Vec::new());
        let drain = || {
            while let Some(b) = cons.borrow_mut().dequeue() {
                sent.borrow_mut().push(b);
            }
        };

        let mut out = QueuedWriter::new(&mut prod, drain);
        writeln!(out, "DATA,4050,2487.31,1234,COAST_DOWN").unwrap();
        assert_eq!(sent.borrow().as_slice(), b"DATA,4050,2487.31,1234,COAST_DOWN\n");
    }

    #[test]
    fn test_short_write_is_queued_and_kicked() {
        let mut queue: Queue<u8, 16> = Queue::new();
        let (mut prod, mut cons) = queue.split();
        let mut kicks = 0;
        {
            let mut out = QueuedWriter::new(&mut prod, || kicks += 1);
            out.write_str("READY\n").unwrap();
        }
        assert_eq!(kicks, 1);
        let bytes: Vec<u8> = core::iter::from_fn(|| cons.dequeue()).collect();
        assert_eq!(bytes, b"READY\n");
    }
}
