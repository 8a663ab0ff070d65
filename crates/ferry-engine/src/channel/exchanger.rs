use super::Channel;
use anyhow::Result as AnyResult;
use ferry_adapterlib::{
    transport::{RecordReceiver, RecordSender},
    Record,
};
use std::{collections::VecDeque, mem, sync::Arc};

/// Moves records through a [`Channel`] in batches.
///
/// On the reader's side, records passed to [`RecordSender::send`] are
/// buffered and pushed into the channel once `buffer_size` of them have
/// accumulated, on [`RecordSender::flush`], and on
/// [`RecordSender::terminate`].  On the writer's side, records are taken
/// from the channel up to `buffer_size` at a time and handed out one by
/// one.
///
/// Each side of a task uses its own exchanger over the shared channel.
pub struct BufferedRecordExchanger {
    channel: Arc<Channel>,
    buffer_size: usize,
    outgoing: Vec<Record>,
    incoming: VecDeque<Record>,
    end_of_stream: bool,
}

impl BufferedRecordExchanger {
    pub fn new(channel: Arc<Channel>, buffer_size: usize) -> Self {
        let buffer_size = buffer_size.max(1);
        Self {
            channel,
            buffer_size,
            outgoing: Vec::with_capacity(buffer_size),
            incoming: VecDeque::new(),
            end_of_stream: false,
        }
    }
}

impl RecordSender for BufferedRecordExchanger {
    fn send(&mut self, record: Record) -> AnyResult<()> {
        self.outgoing.push(record);
        if self.outgoing.len() >= self.buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> AnyResult<()> {
        let batch = mem::replace(&mut self.outgoing, Vec::with_capacity(self.buffer_size));
        self.channel.put_all(batch)?;
        Ok(())
    }

    fn terminate(&mut self) -> AnyResult<()> {
        self.flush()?;
        self.channel.close();
        Ok(())
    }
}

impl RecordReceiver for BufferedRecordExchanger {
    fn receive(&mut self) -> AnyResult<Option<Record>> {
        if self.incoming.is_empty() && !self.end_of_stream {
            let batch = self.channel.take_all(self.buffer_size);
            if batch.is_empty() {
                self.end_of_stream = true;
            }
            self.incoming.extend(batch);
        }
        Ok(self.incoming.pop_front())
    }
}

#[cfg(test)]
mod test {
    use super::BufferedRecordExchanger;
    use crate::{Channel, Communication, Counter, SyncError};
    use ferry_adapterlib::{
        transport::{RecordReceiver, RecordSender},
        Column, Record, State,
    };
    use ferry_types::config::ChannelConfig;
    use std::{sync::Arc, thread};

    fn channel() -> Arc<Channel> {
        let communication = Arc::new(Communication::with_state(State::Running, 0));
        Arc::new(Channel::new(3, &ChannelConfig::default(), communication).unwrap())
    }

    #[test]
    fn buffers_until_full() {
        let channel = channel();
        let mut sender = BufferedRecordExchanger::new(channel.clone(), 4);

        for i in 0..3 {
            sender.send(vec![Column::long(i)].into()).unwrap();
        }
        assert_eq!(channel.size(), 0);

        sender.send(vec![Column::long(3)].into()).unwrap();
        assert_eq!(channel.size(), 4);

        sender.send(vec![Column::long(4)].into()).unwrap();
        sender.flush().unwrap();
        assert_eq!(channel.size(), 5);
    }

    #[test]
    fn transfers_all_records_in_order() {
        let channel = channel();
        let mut sender = BufferedRecordExchanger::new(channel.clone(), 7);
        let mut receiver = BufferedRecordExchanger::new(channel.clone(), 5);

        let producer = thread::spawn(move || {
            for i in 0..100 {
                sender.send(vec![Column::long(i)].into()).unwrap();
            }
            sender.terminate().unwrap();
        });

        let mut received = Vec::new();
        while let Some(record) = receiver.receive().unwrap() {
            received.push(record);
        }
        producer.join().unwrap();

        let expected: Vec<Record> = (0..100).map(|i| vec![Column::long(i)].into()).collect();
        assert_eq!(received, expected);
        assert_eq!(receiver.receive().unwrap(), None);
        assert_eq!(
            channel.communication().counter(Counter::WriteReceivedRecords),
            100
        );
    }

    #[test]
    fn send_after_terminate_fails() {
        let channel = channel();
        let mut sender = BufferedRecordExchanger::new(channel, 1);
        sender.terminate().unwrap();

        let error = sender.send(vec![Column::null()].into()).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<SyncError>(),
            Some(SyncError::ChannelClosed)
        ));
    }
}
