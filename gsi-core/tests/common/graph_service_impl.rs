use futures_util::Stream;
use graph_service::GraphService;
use graph_service::pb::{
    BulkLoadSummary, CreateVertexRequest, Direction, ExpandStep, GetVertexRequest,
    ListVerticesRequest, Vertex,
};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tonic::{Request, Response, Status, Streaming};

/// Vertex id, or label, that fails with `UNAVAILABLE` on its first request.
pub const FLAKY: &str = "flaky";

#[derive(Clone, Default)]
pub struct GraphServiceImpl {
    pub flaky_gets: Arc<AtomicUsize>,
    pub flaky_creates: Arc<AtomicUsize>,
}

fn vertex(id: &str, label: &str) -> Vertex {
    Vertex {
        id: id.to_string(),
        label: label.to_string(),
        properties: HashMap::new(),
    }
}

#[tonic::async_trait]
impl GraphService for GraphServiceImpl {
    type ListVerticesStream = ReceiverStream<Result<Vertex, Status>>;
    type ExpandStream = Pin<Box<dyn Stream<Item = Result<Vertex, Status>> + Send>>;

    async fn get_vertex(
        &self,
        request: Request<GetVertexRequest>,
    ) -> Result<Response<Vertex>, Status> {
        let id = request.into_inner().id;

        match id.as_str() {
            "v1" => Ok(Response::new(vertex("v1", "person"))),
            FLAKY if self.flaky_gets.fetch_add(1, Ordering::SeqCst) == 0 => {
                Err(Status::unavailable("warming up"))
            }
            FLAKY => Ok(Response::new(vertex(FLAKY, "person"))),
            other => Err(Status::not_found(format!("vertex '{other}' not found"))),
        }
    }

    async fn create_vertex(
        &self,
        request: Request<CreateVertexRequest>,
    ) -> Result<Response<Vertex>, Status> {
        let request = request.into_inner();

        if request.label == FLAKY && self.flaky_creates.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(Status::unavailable("warming up"));
        }

        Ok(Response::new(Vertex {
            id: "v100".to_string(),
            label: request.label,
            properties: request.properties,
        }))
    }

    async fn list_vertices(
        &self,
        request: Request<ListVerticesRequest>,
    ) -> Result<Response<Self::ListVerticesStream>, Status> {
        let request = request.into_inner();
        let (tx, rx) = mpsc::channel(4);

        tokio::spawn(async move {
            for i in 0..request.limit {
                let item = vertex(&format!("{}-{i}", request.label), &request.label);
                if tx.send(Ok(item)).await.is_err() {
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn bulk_load(
        &self,
        request: Request<Streaming<Vertex>>,
    ) -> Result<Response<BulkLoadSummary>, Status> {
        let mut stream = request.into_inner();
        let mut loaded = 0;

        while let Some(vertex) = stream.next().await {
            vertex?;
            loaded += 1;
        }

        Ok(Response::new(BulkLoadSummary { loaded }))
    }

    async fn expand(
        &self,
        request: Request<Streaming<ExpandStep>>,
    ) -> Result<Response<Self::ExpandStream>, Status> {
        let mut steps = request.into_inner();
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            while let Some(step) = steps.next().await {
                let reply = step.map(|step| {
                    let label = match step.direction() {
                        Direction::Out => "out",
                        Direction::In => "in",
                        Direction::Unspecified => "any",
                    };
                    vertex(&format!("{}/{}", step.from, step.edge_label), label)
                });
                let failed = reply.is_err();
                if tx.send(reply).await.is_err() || failed {
                    break;
                }
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}
