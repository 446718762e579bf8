use msgjournal::server::grpc::proto::{self, log_client::LogClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = LogClient::connect("http://[::1]:50051").await?;

    println!("connected to server");

    println!("\nproducing records...");
    let records = vec![
        "Hello, gRPC!",
        "This is record 2",
        "Testing the message journal",
        "Fourth record here",
    ];

    let mut offsets = Vec::new();
    for record in &records {
        let request = tonic::Request::new(proto::ProduceRequest {
            key: None,
            payload: record.as_bytes().to_vec(),
        });

        let response = client.produce(request).await?;
        let offset = response.into_inner().offset;
        offsets.push(offset);

        println!("  produced '{record}' -> offset {offset}");
    }

    println!("\nconsuming records (random access)...");
    for &offset in offsets.iter().rev() {
        let request = tonic::Request::new(proto::ConsumeRequest {
            offset,
            max_bytes: 0,
        });
        let response = client.consume(request).await?;
        let inner = response.into_inner();
        for record in &inner.records {
            let payload = String::from_utf8_lossy(&record.payload);
            println!("  offset {} -> '{}'", record.offset, payload);
        }
    }

    println!("\nsequential scan from offset 0...");
    let mut offset = 0;
    loop {
        let request = tonic::Request::new(proto::ConsumeRequest {
            offset,
            max_bytes: 0,
        });
        match client.consume(request).await {
            Ok(response) => {
                let inner = response.into_inner();
                if inner.records.is_empty() {
                    break;
                }
                for record in &inner.records {
                    let payload = String::from_utf8_lossy(&record.payload);
                    println!("  offset {} -> '{}'", record.offset, payload);
                }
                offset = inner.next_offset;
            }
            Err(_) => break,
        }
    }

    println!("\ncommitting up to the last produced offset...");
    if let Some(&last) = offsets.last() {
        let request = tonic::Request::new(proto::CommitRequest { offset: last });
        let response = client.commit(request).await?;
        println!(
            "  committed offset now {}",
            response.into_inner().committed_offset
        );
    }

    println!("\nall operations completed successfully");
    Ok(())
}
