#[cfg(test)]
mod tests {
    use std::{
        net::SocketAddr,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use bytes::Bytes;
    use dotfwd_cache::ResponseCache;
    use dotfwd_client::{ClientConfig, ForwardClient, TcpConnector};
    use dotfwd_dns::{
        ClassType, DnsMessage, DnsMessageBuilder, DnsName, DnsQuestion, DnsRecord,
        DnsResponseCode, RecordType,
    };
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use crate::listener::Forwarder;

    fn query(id: u16, name: &str, qtype: RecordType) -> Bytes {
        DnsMessageBuilder::new()
            .with_id(id)
            .add_question(DnsQuestion::new(
                DnsName::from_dotted(name).unwrap(),
                qtype,
                ClassType::IN,
            ))
            .build()
            .encode()
            .unwrap()
    }

    /// Upstream answering every question with a single A record, or with
    /// NXDOMAIN for names starting with "missing".
    async fn answering_upstream(ttl: u32, hits: Arc<AtomicUsize>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let hits = hits.clone();
                tokio::spawn(async move {
                    loop {
                        let mut len = [0u8; 2];
                        if stream.read_exact(&mut len).await.is_err() {
                            return;
                        }
                        let mut body = vec![0u8; u16::from_be_bytes(len) as usize];
                        if stream.read_exact(&mut body).await.is_err() {
                            return;
                        }
                        hits.fetch_add(1, Ordering::SeqCst);

                        let request = DnsMessage::decode(&body).unwrap();
                        let question = request.questions()[0].clone();
                        let name = question.qname.to_dotted(&body).unwrap();

                        let builder = DnsMessageBuilder::new()
                            .with_id(request.id)
                            .with_header(request.header)
                            .with_questions(vec![question.clone()]);
                        let builder = if name.starts_with("missing") {
                            builder.with_response(DnsResponseCode::NxDomain)
                        } else {
                            builder
                                .add_answer(DnsRecord::new(
                                    question.qname,
                                    RecordType::A,
                                    ClassType::IN,
                                    ttl,
                                    Bytes::from_static(&[192, 0, 2, 1]),
                                ))
                                .with_response(DnsResponseCode::NoError)
                        };
                        let response = builder.build().encode().unwrap();

                        let mut frame = (response.len() as u16).to_be_bytes().to_vec();
                        frame.extend_from_slice(&response);
                        if stream.write_all(&frame).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });
        addr
    }

    async fn forwarder(addr: SocketAddr, query_timeout: Duration) -> Forwarder {
        let client = ForwardClient::new(
            TcpConnector::new(addr),
            ClientConfig {
                connect_timeout: Duration::from_secs(2),
                drain_timeout: Some(Duration::from_secs(1)),
                randomize_ids: false,
            },
        );
        client.start().unwrap();
        Forwarder::new(Arc::new(client), Arc::new(ResponseCache::new(10, 100)), query_timeout)
    }

    #[tokio::test]
    async fn test_second_query_is_served_from_cache() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = answering_upstream(300, hits.clone()).await;
        let forwarder = forwarder(addr, Duration::from_secs(5)).await;

        let first = DnsMessage::decode(&forwarder.handle(query(10, "www.example.com", RecordType::A)).await).unwrap();
        assert_eq!(first.id, 10);
        assert_eq!(first.answers().len(), 1);

        let second_raw = forwarder.handle(query(20, "WWW.example.com", RecordType::A)).await;
        let second = DnsMessage::decode(&second_raw).unwrap();
        assert_eq!(second.id, 20);
        assert_eq!(second.answers(), first.answers());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_answer_ttl_counts_down() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = answering_upstream(300, hits.clone()).await;
        let forwarder = forwarder(addr, Duration::from_secs(5)).await;

        let first = DnsMessage::decode(&forwarder.handle(query(1, "ttl.example", RecordType::A)).await).unwrap();
        assert_eq!(first.answers()[0].ttl, 300);

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let second = DnsMessage::decode(&forwarder.handle(query(2, "ttl.example", RecordType::A)).await).unwrap();
        assert_eq!(second.id, 2);
        assert_eq!(second.answers()[0].ttl, 299);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_uncacheable_answers_are_forwarded_each_time() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = answering_upstream(300, hits.clone()).await;
        let forwarder = forwarder(addr, Duration::from_secs(5)).await;

        // NXDOMAIN is not cached
        for id in 1..=2 {
            let response = DnsMessage::decode(&forwarder.handle(query(id, "missing.example", RecordType::A)).await).unwrap();
            assert_eq!(response.header.response_code(), Some(DnsResponseCode::NxDomain));
        }
        // SOA is not a cacheable type
        for id in 3..=4 {
            forwarder.handle(query(id, "example.com", RecordType::SOA)).await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_zero_ttl_answer_is_not_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = answering_upstream(0, hits.clone()).await;
        let forwarder = forwarder(addr, Duration::from_secs(5)).await;

        forwarder.handle(query(1, "zero.example", RecordType::A)).await;
        forwarder.handle(query(2, "zero.example", RecordType::A)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_garbage_query_gets_servfail() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = answering_upstream(300, hits.clone()).await;
        let forwarder = forwarder(addr, Duration::from_secs(5)).await;

        let response = forwarder.handle(Bytes::from_static(&[0x12, 0x34, 0x01])).await;
        let decoded = DnsMessage::decode(&response).unwrap();
        assert_eq!(decoded.id, 0x1234);
        assert_eq!(decoded.header.response_code(), Some(DnsResponseCode::ServerFailure));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_silent_upstream_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut sink = Vec::new();
                    let _ = stream.read_to_end(&mut sink).await;
                });
            }
        });

        let forwarder = forwarder(addr, Duration::from_millis(100)).await;
        let response = forwarder.handle(query(7, "slow.example", RecordType::A)).await;
        let decoded = DnsMessage::decode(&response).unwrap();
        assert_eq!(decoded.id, 7);
        assert_eq!(decoded.header.response_code(), Some(DnsResponseCode::ServerFailure));
    }
}
